//! 对外流式协议：StreamChunk 及其 SSE 编码
//!
//! 每个流块都带公共信封（id = run_id、model、毫秒时间戳），按 type 区分变体，可序列化为 JSON 供前端逐轮渲染。

pub mod input;
pub mod sse;

use serde::{Deserialize, Serialize};

pub use input::extract_user_text;
pub use sse::{encode_chunk, encode_done, DONE_SENTINEL};

/// 当前毫秒时间戳
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 流块：公共信封 + 变体字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub model: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub body: ChunkBody,
}

/// 流块变体（封闭集合）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChunkBody {
    /// 文本：content 为累计文本，delta 为本次增量
    #[serde(rename = "content")]
    Content {
        content: String,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    #[serde(rename = "tool_call")]
    ToolCall {
        index: u32,
        #[serde(rename = "toolCall")]
        tool_call: ToolCallPayload,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        content: String,
    },
    /// 客户端工具输入就绪：通知前端执行该工具
    #[serde(rename = "tool-input-available")]
    ClientToolInputReady {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "approval-requested")]
    ApprovalRequested {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: serde_json::Value,
        approval: Approval,
    },
    #[serde(rename = "error")]
    Error { error: ErrorInfo },
    #[serde(rename = "done")]
    Done {
        #[serde(rename = "finishReason")]
        finish_reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    /// 固定为 "function"
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// 规范化 JSON 文本
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,
    #[serde(rename = "needsApproval")]
    pub needs_approval: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(rename = "promptTokens")]
    pub prompt_tokens: u64,
    #[serde(rename = "completionTokens")]
    pub completion_tokens: u64,
    #[serde(rename = "totalTokens")]
    pub total_tokens: u64,
}

impl StreamChunk {
    /// 流块类型名（与 JSON 中的 type 一致）
    pub fn kind(&self) -> &'static str {
        match &self.body {
            ChunkBody::Content { .. } => "content",
            ChunkBody::ToolCall { .. } => "tool_call",
            ChunkBody::ToolResult { .. } => "tool_result",
            ChunkBody::ClientToolInputReady { .. } => "tool-input-available",
            ChunkBody::ApprovalRequested { .. } => "approval-requested",
            ChunkBody::Error { .. } => "error",
            ChunkBody::Done { .. } => "done",
        }
    }
}

/// 为同一 Run 构造流块：固定 run_id 与 model，时间戳取构造时刻
#[derive(Debug, Clone)]
pub struct ChunkFactory {
    run_id: String,
    model: String,
}

impl ChunkFactory {
    pub fn new(run_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            model: model.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn wrap(&self, body: ChunkBody) -> StreamChunk {
        StreamChunk {
            id: self.run_id.clone(),
            model: self.model.clone(),
            timestamp: now_ms(),
            body,
        }
    }

    pub fn content(&self, content: impl Into<String>, delta: impl Into<String>) -> StreamChunk {
        self.wrap(ChunkBody::Content {
            content: content.into(),
            delta: delta.into(),
            role: Some("assistant".to_string()),
        })
    }

    pub fn tool_call(
        &self,
        index: u32,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> StreamChunk {
        self.wrap(ChunkBody::ToolCall {
            index,
            tool_call: ToolCallPayload {
                id: tool_call_id.into(),
                kind: "function".to_string(),
                function: ToolCallFunction {
                    name: name.into(),
                    arguments: arguments.into(),
                },
            },
        })
    }

    pub fn tool_result(
        &self,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> StreamChunk {
        self.wrap(ChunkBody::ToolResult {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        })
    }

    pub fn client_tool_input_ready(
        &self,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> StreamChunk {
        self.wrap(ChunkBody::ClientToolInputReady {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
        })
    }

    pub fn approval_requested(
        &self,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> StreamChunk {
        let tool_call_id = tool_call_id.into();
        self.wrap(ChunkBody::ApprovalRequested {
            approval: Approval {
                id: tool_call_id.clone(),
                needs_approval: true,
            },
            tool_call_id,
            tool_name: tool_name.into(),
            input,
        })
    }

    pub fn error(&self, message: impl Into<String>, code: Option<&str>) -> StreamChunk {
        self.wrap(ChunkBody::Error {
            error: ErrorInfo {
                message: message.into(),
                code: code.map(str::to_string),
            },
        })
    }

    pub fn done(&self, finish_reason: FinishReason, usage: Option<Usage>) -> StreamChunk {
        self.wrap(ChunkBody::Done {
            finish_reason,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_wire_shape() {
        let factory = ChunkFactory::new("run-1", "gemini");
        let chunk = factory.tool_call(0, "tc1", "execute_sql", r#"{"sql":"SELECT 1"}"#);
        let v = serde_json::to_value(&chunk).unwrap();

        assert_eq!(v["type"], "tool_call");
        assert_eq!(v["id"], "run-1");
        assert_eq!(v["model"], "gemini");
        assert_eq!(v["index"], 0);
        assert_eq!(v["toolCall"]["id"], "tc1");
        assert_eq!(v["toolCall"]["type"], "function");
        assert_eq!(v["toolCall"]["function"]["name"], "execute_sql");
        assert_eq!(v["toolCall"]["function"]["arguments"], r#"{"sql":"SELECT 1"}"#);
    }

    #[test]
    fn test_approval_requested_wire_shape() {
        let factory = ChunkFactory::new("run-1", "gemini");
        let chunk = factory.approval_requested("tc1", "execute_sql", json!({"sql": "SELECT 1"}));
        let v = serde_json::to_value(&chunk).unwrap();

        assert_eq!(v["type"], "approval-requested");
        assert_eq!(v["toolCallId"], "tc1");
        assert_eq!(v["toolName"], "execute_sql");
        assert_eq!(v["approval"], json!({"id": "tc1", "needsApproval": true}));
        assert_eq!(chunk.kind(), "approval-requested");
    }

    #[test]
    fn test_done_and_error_omit_empty_optionals() {
        let factory = ChunkFactory::new("run-1", "gemini");
        let done = serde_json::to_value(factory.done(FinishReason::Stop, None)).unwrap();
        assert_eq!(done["finishReason"], "stop");
        assert!(done.get("usage").is_none());

        let err = serde_json::to_value(factory.error("boom", None)).unwrap();
        assert_eq!(err["error"], json!({"message": "boom"}));
    }

    #[test]
    fn test_chunk_deserializes_back() {
        let raw = json!({
            "id": "run-1",
            "model": "gemini",
            "timestamp": 1,
            "type": "tool-input-available",
            "toolCallId": "tc2",
            "toolName": "export_csv",
            "input": {"artifact_id": "a1"}
        });
        let chunk: StreamChunk = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            chunk.body,
            ChunkBody::ClientToolInputReady { ref tool_name, .. } if tool_name == "export_csv"
        ));
    }
}
