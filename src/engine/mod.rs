//! 智能体执行引擎抽象
//!
//! 引擎本身是黑盒：给定用户消息或合成的工具响应消息，返回异步的 RunEvent 流，
//! 并按 run_id 维护可恢复会话。所有后端（真实引擎 / Mock / 脚本回放）实现 AgentEngine。

pub mod mock;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::core::HiveError;

pub use mock::{MockEngine, RecordedInvocation, ScriptedEngine};

/// 引擎通用的「需要确认」信号所使用的工具名
pub const REQUEST_CONFIRMATION_TOOL: &str = "adk_request_confirmation";

/// 引擎事件流
pub type RunEventStream = Pin<Box<dyn Stream<Item = Result<RunEvent, HiveError>> + Send>>;

/// 引擎发出的工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    /// 调用参数；引擎未给出时为 None
    pub args: Option<serde_json::Value>,
}

/// 工具响应（引擎产出，或由编排器合成后回传给引擎）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: Option<String>,
    pub name: String,
    pub response: Option<serde_json::Value>,
}

/// 内容片段：封闭的三种变体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResponse(ToolResponse),
}

/// 引擎单个运行事件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub invocation_id: Option<String>,
    /// Some(true) 表示流式中间片段；None / Some(false) 表示最终片段
    pub partial: Option<bool>,
    pub parts: Vec<Part>,
    /// 引擎在本事件上标记为「确认交换」的工具调用 ID
    #[serde(default)]
    pub resolved_confirmations: Vec<String>,
}

impl RunEvent {
    pub fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: Some(invocation_id.into()),
            ..Default::default()
        }
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = Some(partial);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text { text: text.into() });
        self
    }

    pub fn tool_call(
        mut self,
        id: Option<&str>,
        name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        self.parts.push(Part::ToolCall(ToolCall {
            id: id.map(str::to_string),
            name: name.into(),
            args: Some(args),
        }));
        self
    }

    pub fn tool_response(
        mut self,
        id: Option<&str>,
        name: impl Into<String>,
        response: serde_json::Value,
    ) -> Self {
        self.parts.push(Part::ToolResponse(ToolResponse {
            id: id.map(str::to_string),
            name: name.into(),
            response: Some(response),
        }));
        self
    }

    pub fn resolved_confirmation(mut self, id: impl Into<String>) -> Self {
        self.resolved_confirmations.push(id.into());
        self
    }

    /// 引擎发出的确认请求：包裹原始工具调用
    pub fn confirmation_request(
        self,
        confirmation_id: &str,
        original_id: &str,
        original_name: &str,
        original_args: serde_json::Value,
    ) -> Self {
        self.tool_call(
            Some(confirmation_id),
            REQUEST_CONFIRMATION_TOOL,
            serde_json::json!({
                "originalFunctionCall": {
                    "id": original_id,
                    "name": original_name,
                    "args": original_args,
                }
            }),
        )
    }
}

/// 送入引擎的一条输入消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineInput {
    /// 用户文本
    UserText { text: String },
    /// 合成的工具响应（审批确认 / 客户端工具结果）
    ToolResponses { responses: Vec<ToolResponse> },
}

/// 智能体执行引擎接口
#[async_trait]
pub trait AgentEngine: Send + Sync {
    /// 确保 run_id 对应的引擎会话存在（不存在则创建）
    async fn start_or_get_session(&self, run_id: &str) -> Result<(), HiveError>;

    /// 发起一次引擎调用；invocation_id 非空时恢复对应的挂起轮次
    async fn invoke(
        &self,
        run_id: &str,
        input: EngineInput,
        invocation_id: Option<String>,
    ) -> Result<RunEventStream, HiveError>;
}
