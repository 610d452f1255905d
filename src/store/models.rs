//! 待决动作与 Run 状态模型

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 待决动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    /// 需要人工确认/拒绝后才能执行的工具调用
    Approval,
    /// 在客户端执行、结果需回传给引擎的工具调用
    ClientTool,
}

/// 智能体发出的、必须等待外部决策才能继续的动作。创建后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: PendingKind,
    /// 客户端用于关联决策的工具调用 ID
    pub tool_call_id: String,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    /// 产生该动作的引擎轮次 ID，续跑时需显式回传
    pub invocation_id: Option<String>,
    /// 引擎内部确认交换的关联 ID（仅 Approval）
    pub engine_confirmation_id: Option<String>,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
}

impl PendingAction {
    pub fn approval(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: serde_json::Value,
        invocation_id: Option<String>,
        engine_confirmation_id: Option<String>,
    ) -> Self {
        Self {
            kind: PendingKind::Approval,
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            tool_input,
            invocation_id,
            engine_confirmation_id,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn client_tool(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: serde_json::Value,
        invocation_id: Option<String>,
    ) -> Self {
        Self {
            kind: PendingKind::ClientTool,
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            tool_input,
            invocation_id,
            engine_confirmation_id: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 单个 Run 的状态（按 run_id 一份）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub session_id: String,
    /// 最近一次观察到的引擎轮次 ID
    pub invocation_id: Option<String>,
    pub pending_approvals: IndexMap<String, PendingAction>,
    pub pending_client_tools: IndexMap<String, PendingAction>,
}

impl RunState {
    /// 会话 ID 与 run_id 相同：一个 Run 对应引擎侧一个可恢复会话
    pub fn new(run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        Self {
            session_id: run_id.clone(),
            run_id,
            ..Default::default()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_approvals.is_empty() || !self.pending_client_tools.is_empty()
    }
}
