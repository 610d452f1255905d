//! 续跑协调器：按 run_id 的会合点
//!
//! 外部调用方通过 push 投递决策载荷（非阻塞），编排器通过 wait 阻塞等待。
//! 在 wait 注册前到达的载荷按先进先出排队，不会丢失。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::core::HiveError;

/// 续跑载荷：审批决策与客户端工具结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuationPayload {
    #[serde(default)]
    pub run_id: String,
    /// tool_call_id -> 是否批准
    #[serde(default)]
    pub approvals: IndexMap<String, bool>,
    /// tool_call_id -> 结果值，或 {"output": 结果值}
    #[serde(default)]
    pub tool_results: IndexMap<String, serde_json::Value>,
}

impl ContinuationPayload {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    pub fn approve(mut self, tool_call_id: impl Into<String>, approved: bool) -> Self {
        self.approvals.insert(tool_call_id.into(), approved);
        self
    }

    pub fn tool_result(
        mut self,
        tool_call_id: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        self.tool_results.insert(tool_call_id.into(), result);
        self
    }
}

/// 单个 Run 的队列：发送端常驻，接收端由等待方独占
struct RunQueue {
    tx: mpsc::UnboundedSender<ContinuationPayload>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<ContinuationPayload>>>,
}

impl RunQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

/// 续跑会合中心（内存版）
#[derive(Default)]
pub struct ContinuationHub {
    queues: StdMutex<HashMap<String, RunQueue>>,
}

impl ContinuationHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_queue<R>(&self, run_id: &str, f: impl FnOnce(&RunQueue) -> R) -> R {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let queue = queues
            .entry(run_id.to_string())
            .or_insert_with(RunQueue::new);
        f(queue)
    }

    /// 阻塞等待该 Run 的下一个载荷；无超时
    pub async fn wait(&self, run_id: &str) -> Result<ContinuationPayload, HiveError> {
        let rx = self.with_queue(run_id, |q| Arc::clone(&q.rx));
        let mut rx = rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| HiveError::ContinuationClosed(run_id.to_string()))
    }

    /// 投递载荷（非阻塞）
    pub fn push(&self, run_id: &str, payload: ContinuationPayload) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let queue = queues.entry(run_id.to_string()).or_insert_with(|| {
            tracing::debug!(run_id, "No active wait, continuation queued for a later wait");
            RunQueue::new()
        });
        if queue.tx.send(payload).is_err() {
            tracing::warn!(run_id, "Continuation queue closed, payload dropped");
        }
    }

    /// 释放该 Run 的队列；正在等待的一方会收到 ContinuationClosed
    pub fn release(&self, run_id: &str) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        if queues.remove(run_id).is_some() {
            tracing::debug!(run_id, "Continuation queue released");
        }
    }

    /// 当前持有队列的 Run 数
    pub fn tracked_runs(&self) -> usize {
        self.queues.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_push_before_wait_is_fifo() {
        let hub = ContinuationHub::new();
        hub.push("run-1", ContinuationPayload::new("run-1").approve("tc1", true));
        hub.push("run-1", ContinuationPayload::new("run-1").approve("tc2", false));

        let first = hub.wait("run-1").await.unwrap();
        let second = hub.wait("run-1").await.unwrap();
        assert_eq!(first.approvals.get("tc1"), Some(&true));
        assert_eq!(second.approvals.get("tc2"), Some(&false));
    }

    #[tokio::test]
    async fn test_wait_then_push_wakes_waiter() {
        let hub = Arc::new(ContinuationHub::new());
        let waiter = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.wait("run-1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.push(
            "run-1",
            ContinuationPayload::new("run-1").tool_result("tc9", json!({"output": "ok"})),
        );

        let payload = waiter.await.unwrap().unwrap();
        assert_eq!(payload.tool_results["tc9"], json!({"output": "ok"}));
    }

    #[tokio::test]
    async fn test_runs_do_not_share_queues() {
        let hub = ContinuationHub::new();
        hub.push("run-a", ContinuationPayload::new("run-a").approve("tc1", true));

        let other = tokio::time::timeout(Duration::from_millis(30), hub.wait("run-b")).await;
        assert!(other.is_err(), "run-b must not receive run-a's payload");

        let mine = hub.wait("run-a").await.unwrap();
        assert_eq!(mine.run_id, "run-a");
    }

    #[tokio::test]
    async fn test_release_closes_waiter() {
        let hub = Arc::new(ContinuationHub::new());
        let waiter = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.wait("run-1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.release("run-1");

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(HiveError::ContinuationClosed(_))));
        assert_eq!(hub.tracked_runs(), 0);
    }

    #[tokio::test]
    async fn test_push_after_release_is_held_for_next_wait() {
        let hub = ContinuationHub::new();
        hub.push("run-1", ContinuationPayload::new("run-1").approve("tc1", true));
        hub.wait("run-1").await.unwrap();
        hub.release("run-1");
        assert_eq!(hub.tracked_runs(), 0);

        hub.push("run-1", ContinuationPayload::new("run-1").approve("tc2", false));
        assert_eq!(hub.tracked_runs(), 1);
        let late = hub.wait("run-1").await.unwrap();
        assert_eq!(late.approvals.get("tc2"), Some(&false));
    }

    #[test]
    fn test_payload_deserialize_defaults() {
        // 按请求体原文解析，保留键的出现顺序
        let payload: ContinuationPayload =
            serde_json::from_str(r#"{"run_id":"r","approvals":{"b":true,"a":false}}"#).unwrap();
        assert!(payload.tool_results.is_empty());
        let keys: Vec<_> = payload.approvals.keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
