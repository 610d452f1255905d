//! 内存 Run 存储
//!
//! 外层表只在查找/插入 Run 时加锁，单个 Run 的状态各自持有一把锁，不同 Run 之间不共享可变状态。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::models::{PendingAction, RunState};
use super::RunStore;

/// 进程内易失存储，随进程生命周期回收
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, Arc<Mutex<RunState>>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, run_id: &str) -> Option<Arc<Mutex<RunState>>> {
        self.runs.read().await.get(run_id).cloned()
    }

    async fn slot_or_create(&self, run_id: &str) -> Arc<Mutex<RunState>> {
        if let Some(slot) = self.slot(run_id).await {
            return slot;
        }
        let mut runs = self.runs.write().await;
        runs.entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RunState::new(run_id))))
            .clone()
    }

    /// 当前跟踪的 Run 数量
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn get_or_create(&self, run_id: &str) -> RunState {
        self.slot_or_create(run_id).await.lock().await.clone()
    }

    async fn get(&self, run_id: &str) -> Option<RunState> {
        let slot = self.slot(run_id).await?;
        let state = slot.lock().await.clone();
        Some(state)
    }

    async fn set_invocation_id(&self, run_id: &str, invocation_id: &str) {
        let slot = self.slot_or_create(run_id).await;
        slot.lock().await.invocation_id = Some(invocation_id.to_string());
    }

    async fn add_pending_approval(&self, run_id: &str, action: PendingAction) {
        let slot = self.slot_or_create(run_id).await;
        slot.lock()
            .await
            .pending_approvals
            .insert(action.tool_call_id.clone(), action);
    }

    async fn add_pending_client_tool(&self, run_id: &str, action: PendingAction) {
        let slot = self.slot_or_create(run_id).await;
        slot.lock()
            .await
            .pending_client_tools
            .insert(action.tool_call_id.clone(), action);
    }

    async fn get_pending_approval(
        &self,
        run_id: &str,
        tool_call_id: &str,
    ) -> Option<PendingAction> {
        let slot = self.slot(run_id).await?;
        let state = slot.lock().await;
        state.pending_approvals.get(tool_call_id).cloned()
    }

    async fn get_pending_client_tool(
        &self,
        run_id: &str,
        tool_call_id: &str,
    ) -> Option<PendingAction> {
        let slot = self.slot(run_id).await?;
        let state = slot.lock().await;
        state.pending_client_tools.get(tool_call_id).cloned()
    }

    async fn pop_pending_approval(
        &self,
        run_id: &str,
        tool_call_id: &str,
    ) -> Option<PendingAction> {
        let slot = self.slot(run_id).await?;
        let mut state = slot.lock().await;
        state.pending_approvals.shift_remove(tool_call_id)
    }

    async fn pop_pending_client_tool(
        &self,
        run_id: &str,
        tool_call_id: &str,
    ) -> Option<PendingAction> {
        let slot = self.slot(run_id).await?;
        let mut state = slot.lock().await;
        state.pending_client_tools.shift_remove(tool_call_id)
    }

    async fn has_pending(&self, run_id: &str) -> bool {
        match self.slot(run_id).await {
            Some(slot) => slot.lock().await.has_pending(),
            None => false,
        }
    }
}
