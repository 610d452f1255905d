//! 待决动作存储抽象层
//!
//! 定义按 run_id 分片的统一存储接口；参考实现为进程内易失存储，可替换为持久化后端而不影响翻译逻辑。

mod memory;
mod models;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StoreSection;
use crate::core::HiveError;

pub use memory::MemoryRunStore;
pub use models::{PendingAction, PendingKind, RunState};

/// Run 存储接口；所有操作对单个 Run 原子，不同 Run 之间互不干扰
#[async_trait]
pub trait RunStore: Send + Sync {
    /// 获取或创建 Run 状态（幂等）
    async fn get_or_create(&self, run_id: &str) -> RunState;

    /// 获取 Run 状态快照，不存在则返回 None
    async fn get(&self, run_id: &str) -> Option<RunState>;

    /// 覆盖 Run 最近的引擎轮次 ID
    async fn set_invocation_id(&self, run_id: &str, invocation_id: &str);

    /// 登记待确认动作；同一 tool_call_id 后写覆盖先写
    async fn add_pending_approval(&self, run_id: &str, action: PendingAction);

    /// 登记待客户端执行动作；同一 tool_call_id 后写覆盖先写
    async fn add_pending_client_tool(&self, run_id: &str, action: PendingAction);

    async fn get_pending_approval(
        &self,
        run_id: &str,
        tool_call_id: &str,
    ) -> Option<PendingAction>;

    async fn get_pending_client_tool(
        &self,
        run_id: &str,
        tool_call_id: &str,
    ) -> Option<PendingAction>;

    /// 读取并移除；未命中返回 None（调用方视为无事可做）
    async fn pop_pending_approval(
        &self,
        run_id: &str,
        tool_call_id: &str,
    ) -> Option<PendingAction>;

    async fn pop_pending_client_tool(
        &self,
        run_id: &str,
        tool_call_id: &str,
    ) -> Option<PendingAction>;

    /// 两个待决映射任一非空即为 true；编排器唯一的循环终止判据
    async fn has_pending(&self, run_id: &str) -> bool;
}

/// 按配置创建 Run 存储；目前只支持 memory
pub fn create_run_store(cfg: &StoreSection) -> Result<Arc<dyn RunStore>, HiveError> {
    match cfg.backend.to_lowercase().as_str() {
        "memory" => {
            tracing::info!("Using in-memory run store");
            Ok(Arc::new(MemoryRunStore::new()))
        }
        other => Err(HiveError::UnsupportedStore(other.to_string())),
    }
}
