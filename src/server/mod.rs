//! HTTP 传输层（axum，feature = "web"）
//!
//! - `POST /api/chat`：解析最近一条用户消息，驱动一个 Run，以 SSE 推送流块，done 之后补一条 `[DONE]`
//! - `POST /api/continuation`：把审批决定 / 客户端工具结果投递给等待中的 Run
//! - `GET /health`：存活检查
//!
//! 响应体被丢弃（客户端断开）时取消对应 Run 的等待。

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::continuation::ContinuationPayload;
use crate::core::RunOrchestrator;
use crate::protocol::input::resolve_run_id;
use crate::protocol::{encode_chunk, encode_done, extract_user_text, ChunkBody, StreamChunk};

/// SSE 心跳注释帧（客户端忽略）
const KEEPALIVE_FRAME: &str = ": keepalive\n\n";

/// 路由共享状态
pub struct AppState {
    pub orchestrator: Arc<RunOrchestrator>,
    /// SSE 心跳间隔；None 表示不发送
    pub keepalive: Option<Duration>,
}

impl AppState {
    pub fn new(orchestrator: Arc<RunOrchestrator>, keepalive_secs: u64) -> Self {
        Self {
            orchestrator,
            keepalive: (keepalive_secs > 0).then(|| Duration::from_secs(keepalive_secs)),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/continuation", post(api_continuation))
        .route("/health", get(health))
        .with_state(state)
}

/// 绑定地址并开始服务，直到出错
pub async fn serve(state: Arc<AppState>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router(state)).await
}

/// POST /api/chat：body 为 { messages: [...], run_id?, data?: { run_id? } }
async fn api_chat(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let run_id = resolve_run_id(&body);
    let user_text = body
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| extract_user_text(messages));

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        let outcome = orchestrator
            .drive(&run_id, user_text.as_deref(), &tx, cancel)
            .await;
        tracing::debug!(run_id, ?outcome, "Chat stream finished");
    });

    let keepalive = state
        .keepalive
        .map(|period| tokio::time::interval_at(Instant::now() + period, period));
    let frames = sse_frames(ChunkStream {
        rx,
        keepalive,
        _guard: guard,
        finished: false,
    });

    let mut res = Response::new(Body::from_stream(frames));
    let headers = res.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    res
}

/// POST /api/continuation：body 为 { run_id, approvals?, tool_results? }
async fn api_continuation(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ContinuationPayload>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let run_id = payload.run_id.trim().to_string();
    if run_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "run_id is required".to_string()));
    }
    tracing::info!(
        run_id,
        approvals = payload.approvals.len(),
        tool_results = payload.tool_results.len(),
        "Continuation received"
    );
    state.orchestrator.hub().push(&run_id, payload);
    Ok(Json(json!({ "status": "ok" })))
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "model": state.orchestrator.model() }))
}

/// 响应体状态：持有 DropGuard，响应体被丢弃即取消 Run
struct ChunkStream {
    rx: mpsc::UnboundedReceiver<StreamChunk>,
    keepalive: Option<Interval>,
    _guard: DropGuard,
    finished: bool,
}

fn sse_frames(
    state: ChunkStream,
) -> impl futures_util::Stream<Item = Result<Bytes, Infallible>> + Send {
    stream::unfold(state, |mut st| async move {
        if st.finished {
            return None;
        }
        let frame = loop {
            let next = match st.keepalive.as_mut() {
                Some(interval) => tokio::select! {
                    chunk = st.rx.recv() => Some(chunk),
                    _ = interval.tick() => None,
                },
                None => Some(st.rx.recv().await),
            };
            let chunk = match next {
                None => break KEEPALIVE_FRAME.to_string(),
                Some(None) => return None,
                Some(Some(chunk)) => chunk,
            };
            match encode_chunk(&chunk) {
                Ok(mut frame) => {
                    if matches!(chunk.body, ChunkBody::Done { .. }) {
                        frame.push_str(&encode_done());
                        st.finished = true;
                    }
                    break frame;
                }
                Err(e) => tracing::warn!("Failed to encode stream chunk: {}", e),
            }
        };
        Some((Ok(Bytes::from(frame)), st))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::ContinuationHub;
    use crate::engine::MockEngine;
    use crate::store::MemoryRunStore;
    use crate::tools::ClientToolRegistry;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<ContinuationHub>) {
        let hub = Arc::new(ContinuationHub::new());
        let orchestrator = RunOrchestrator::new(
            Arc::new(MockEngine::new()),
            Arc::new(MemoryRunStore::new()),
            Arc::clone(&hub),
            Arc::new(ClientToolRegistry::new()),
            "test-model",
        );
        let state = Arc::new(AppState::new(Arc::new(orchestrator), 0));
        (router(state), hub)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v: Value = serde_json::from_str(&body_text(res).await).unwrap();
        assert_eq!(v, json!({"status": "ok", "model": "test-model"}));
    }

    #[tokio::test]
    async fn test_continuation_requires_run_id() {
        let (app, _) = app();
        let res = app
            .oneshot(post_json("/api/continuation", json!({"approvals": {"tc1": true}})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_continuation_is_queued() {
        let (app, hub) = app();
        let res = app
            .oneshot(post_json(
                "/api/continuation",
                json!({"run_id": "r1", "approvals": {"tc1": false}}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, r#"{"status":"ok"}"#);

        let payload = hub.wait("r1").await.unwrap();
        assert_eq!(payload.approvals.get("tc1"), Some(&false));
    }

    #[tokio::test]
    async fn test_chat_streams_sse_until_done() {
        let (app, _) = app();
        let res = app
            .oneshot(post_json(
                "/api/chat",
                json!({"run_id": "r1", "messages": [{"role": "user", "content": "hi"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(res.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");

        let text = body_text(res).await;
        let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.last(), Some(&"data: [DONE]"));

        let chunks: Vec<Value> = frames[..frames.len() - 1]
            .iter()
            .map(|f| serde_json::from_str(f.trim_start_matches("data: ")).unwrap())
            .collect();
        assert!(chunks.iter().all(|c| c["id"] == "r1" && c["model"] == "test-model"));
        assert_eq!(chunks.last().unwrap()["type"], "done");
        assert_eq!(chunks.last().unwrap()["finishReason"], "stop");
        let final_content = chunks
            .iter()
            .filter(|c| c["type"] == "content")
            .last()
            .unwrap();
        assert_eq!(final_content["content"], "Echo from Mock: hi");
    }

    #[tokio::test]
    async fn test_chat_without_user_text_emits_done_only() {
        let (app, _) = app();
        let res = app
            .oneshot(post_json("/api/chat", json!({"messages": []})))
            .await
            .unwrap();
        let text = body_text(res).await;
        let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains(r#""type":"done""#));
        assert_eq!(frames[1], "data: [DONE]");
    }
}
