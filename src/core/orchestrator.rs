//! Run 编排器：主控循环
//!
//! 负责：从用户输入启动 Run、把翻译后的流块推给调用方；引擎事件流结束后若仍有待决动作，
//! 则等待续跑载荷、合成后续输入并重新调用引擎，直到没有待决动作，最后发出 done。
//!
//! 同一 Run 内严格串行：上一轮引擎调用流完之前不会发起下一轮，也不会并发处理两个续跑载荷。

use std::sync::Arc;

use futures_util::StreamExt;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::continuation::{ContinuationHub, ContinuationPayload};
use crate::engine::{AgentEngine, EngineInput, ToolResponse, REQUEST_CONFIRMATION_TOOL};
use crate::protocol::{ChunkFactory, FinishReason, StreamChunk};
use crate::store::{PendingAction, RunStore};
use crate::tools::ClientToolRegistry;
use crate::translator::EventTranslator;

/// 流块发送端（调用方持有接收端，如 SSE 响应体）
pub type ChunkSender = mpsc::UnboundedSender<StreamChunk>;

/// drive 的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 无待决动作，已发出 done
    Completed,
    /// 等待续跑时被取消
    Cancelled,
    /// 等待续跑时调用方断开（接收端已关闭）
    Disconnected,
}

fn emit(tx: &ChunkSender, chunk: StreamChunk) {
    let _ = tx.send(chunk);
}

/// Run 编排器：持有引擎、存储、续跑中心，可多 Run 共享
pub struct RunOrchestrator {
    engine: Arc<dyn AgentEngine>,
    store: Arc<dyn RunStore>,
    hub: Arc<ContinuationHub>,
    client_tools: Arc<ClientToolRegistry>,
    model: String,
}

impl RunOrchestrator {
    pub fn new(
        engine: Arc<dyn AgentEngine>,
        store: Arc<dyn RunStore>,
        hub: Arc<ContinuationHub>,
        client_tools: Arc<ClientToolRegistry>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            store,
            hub,
            client_tools,
            model: model.into(),
        }
    }

    pub fn hub(&self) -> &Arc<ContinuationHub> {
        &self.hub
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 为 run_id 创建一个 Run 实例（翻译器状态从零开始）
    pub fn session(&self, run_id: &str) -> RunSession<'_> {
        let factory = ChunkFactory::new(run_id, self.model.clone());
        RunSession {
            orchestrator: self,
            run_id: run_id.to_string(),
            translator: EventTranslator::new(
                factory.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.client_tools),
            ),
            factory,
        }
    }

    /// 完整驱动一个 Run：Start -> (等待续跑 -> Resume)* -> done
    ///
    /// user_text 为空时不调用引擎，直接发出 done。
    pub async fn drive(
        &self,
        run_id: &str,
        user_text: Option<&str>,
        chunk_tx: &ChunkSender,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let span = tracing::info_span!("run", run_id);
        async move {
            let mut session = self.session(run_id);
            if let Some(text) = user_text.map(str::trim).filter(|t| !t.is_empty()) {
                tracing::info!("Run started");
                session.start(text, chunk_tx).await;
            }

            while session.has_pending().await {
                let waited = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Run cancelled while waiting for continuation");
                        self.hub.release(run_id);
                        return RunOutcome::Cancelled;
                    }
                    _ = chunk_tx.closed() => {
                        tracing::info!("Caller disconnected while waiting for continuation");
                        self.hub.release(run_id);
                        return RunOutcome::Disconnected;
                    }
                    waited = self.hub.wait(run_id) => waited,
                };

                match waited {
                    Ok(payload) => session.resume(payload, chunk_tx).await,
                    Err(e) => {
                        tracing::warn!("Continuation wait failed: {}", e);
                        emit(chunk_tx, session.factory.error(e.to_string(), e.code()));
                        return RunOutcome::Cancelled;
                    }
                }
            }

            emit(chunk_tx, session.done_chunk());
            self.hub.release(run_id);
            tracing::info!("Run completed");
            RunOutcome::Completed
        }
        .instrument(span)
        .await
    }
}

/// 单个 Run 实例：两个入口（start / resume）共享同一个翻译器
pub struct RunSession<'a> {
    orchestrator: &'a RunOrchestrator,
    run_id: String,
    translator: EventTranslator,
    factory: ChunkFactory,
}

impl RunSession<'_> {
    /// Run 是否仍有待决动作
    pub async fn has_pending(&self) -> bool {
        self.orchestrator.store.has_pending(&self.run_id).await
    }

    /// 终止流块
    pub fn done_chunk(&self) -> StreamChunk {
        self.factory.done(FinishReason::Stop, None)
    }

    /// Start：确保 Run 与引擎会话存在，以用户消息发起一次引擎调用
    pub async fn start(&mut self, user_text: &str, tx: &ChunkSender) {
        let orch = self.orchestrator;
        orch.store.get_or_create(&self.run_id).await;
        if let Err(e) = orch.engine.start_or_get_session(&self.run_id).await {
            tracing::warn!(run_id = %self.run_id, "Failed to start engine session: {}", e);
            emit(tx, self.translator.on_engine_error(&e));
            return;
        }
        self.invoke(
            EngineInput::UserText {
                text: user_text.to_string(),
            },
            None,
            tx,
        )
        .await;
    }

    /// Resume：按载荷解决待决动作，按轮次分组合成工具响应，每组调用一次引擎
    pub async fn resume(&mut self, payload: ContinuationPayload, tx: &ChunkSender) {
        let orch = self.orchestrator;
        let run_id = self.run_id.clone();
        orch.store.get_or_create(&run_id).await;

        let mut groups: IndexMap<Option<String>, Vec<ToolResponse>> = IndexMap::new();

        for (tool_call_id, approved) in &payload.approvals {
            let Some(pending) = orch.store.pop_pending_approval(&run_id, tool_call_id).await else {
                tracing::debug!(run_id, tool_call_id, "Ignoring approval for unknown tool call");
                continue;
            };
            tracing::info!(run_id, tool_call_id, approved, "Approval resolved");

            // 客户端工具的去留只取决于审批结果，与引擎确认 ID 无关
            if orch.client_tools.contains(&pending.tool_name) {
                if *approved {
                    orch.store
                        .add_pending_client_tool(
                            &run_id,
                            PendingAction::client_tool(
                                pending.tool_call_id.clone(),
                                pending.tool_name.clone(),
                                pending.tool_input.clone(),
                                pending.invocation_id.clone(),
                            ),
                        )
                        .await;
                    emit(
                        tx,
                        self.factory.client_tool_input_ready(
                            pending.tool_call_id.clone(),
                            pending.tool_name.clone(),
                            pending.tool_input.clone(),
                        ),
                    );
                } else {
                    orch.store
                        .pop_pending_client_tool(&run_id, &pending.tool_call_id)
                        .await;
                }
            }

            let Some(confirmation_id) = pending.engine_confirmation_id else {
                tracing::warn!(run_id, tool_call_id, "Pending approval has no confirmation id");
                continue;
            };
            groups
                .entry(pending.invocation_id)
                .or_default()
                .push(ToolResponse {
                    id: Some(confirmation_id),
                    name: REQUEST_CONFIRMATION_TOOL.to_string(),
                    response: Some(json!({ "confirmed": approved })),
                });
        }

        for (tool_call_id, result) in &payload.tool_results {
            let Some(pending) = orch.store.pop_pending_client_tool(&run_id, tool_call_id).await
            else {
                tracing::debug!(run_id, tool_call_id, "Ignoring result for unknown tool call");
                continue;
            };
            groups
                .entry(pending.invocation_id.clone())
                .or_default()
                .push(ToolResponse {
                    id: Some(pending.tool_call_id.clone()),
                    name: pending.tool_name.clone(),
                    response: Some(json!({ "output": unwrap_output(result) })),
                });
        }

        for (invocation_id, responses) in groups {
            self.invoke(EngineInput::ToolResponses { responses }, invocation_id, tx)
                .await;
        }
    }

    /// 一次引擎调用：流式翻译事件；任何失败在此边界转为单个 error 流块
    async fn invoke(
        &mut self,
        input: EngineInput,
        invocation_id: Option<String>,
        tx: &ChunkSender,
    ) {
        let engine = Arc::clone(&self.orchestrator.engine);
        let mut events = match engine.invoke(&self.run_id, input, invocation_id).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(run_id = %self.run_id, "Engine invocation failed: {}", e);
                emit(tx, self.translator.on_engine_error(&e));
                return;
            }
        };

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    for chunk in self.translator.on_event(&event).await {
                        emit(tx, chunk);
                    }
                }
                Err(e) => {
                    tracing::warn!(run_id = %self.run_id, "Engine stream failed: {}", e);
                    emit(tx, self.translator.on_engine_error(&e));
                    return;
                }
            }
        }
    }
}

/// 客户端工具结果可以是值本身，也可以是 {"output": 值}
fn unwrap_output(result: &Value) -> Value {
    match result {
        Value::Object(map) if map.contains_key("output") => map["output"].clone(),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_output() {
        assert_eq!(unwrap_output(&json!({"output": {"rows": 2}})), json!({"rows": 2}));
        assert_eq!(unwrap_output(&json!({"saved": true})), json!({"saved": true}));
        assert_eq!(unwrap_output(&json!("file.csv")), json!("file.csv"));
    }
}
