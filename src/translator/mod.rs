//! 事件翻译器：引擎 RunEvent -> 对外 StreamChunk
//!
//! 每个 Run 实例一个翻译器，持有累计文本与工具调用序号（构造时归零）。
//! 翻译过程中会向 RunStore 登记待决动作（审批 / 客户端工具），并据此对事件分类。
//!
//! # 文本累计规则
//!
//! - 流式片段（partial = true）：整段追加并作为 delta 发出
//! - 最终片段：若是当前累计文本的前缀延续，只发出不重叠的后缀；否则视为新文本整段追加
//! - content 字段始终为追加后的累计文本，前端可按 delta 增量渲染，也可按 content 重新同步

use std::sync::Arc;

use serde_json::Value;

use crate::core::HiveError;
use crate::engine::{Part, RunEvent, ToolCall, ToolResponse, REQUEST_CONFIRMATION_TOOL};
use crate::protocol::{ChunkFactory, StreamChunk};
use crate::store::{PendingAction, RunStore};
use crate::tools::ClientToolRegistry;

/// 工具结果展示值的候选字段，按优先级排列
const RESULT_FIELDS: [&str; 3] = ["output", "result", "response"];

/// 有状态翻译器（单个 Run 实例）
pub struct EventTranslator {
    factory: ChunkFactory,
    store: Arc<dyn RunStore>,
    client_tools: Arc<ClientToolRegistry>,
    text_accumulator: String,
    tool_call_index: u32,
}

impl EventTranslator {
    pub fn new(
        factory: ChunkFactory,
        store: Arc<dyn RunStore>,
        client_tools: Arc<ClientToolRegistry>,
    ) -> Self {
        Self {
            factory,
            store,
            client_tools,
            text_accumulator: String::new(),
            tool_call_index: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        self.factory.run_id()
    }

    /// 到目前为止累计的文本
    pub fn accumulated_text(&self) -> &str {
        &self.text_accumulator
    }

    /// 翻译一个引擎事件，返回零个或多个流块
    pub async fn on_event(&mut self, event: &RunEvent) -> Vec<StreamChunk> {
        let run_id = self.factory.run_id().to_string();

        // 先写入轮次 ID，保证同一事件内后续登记的待决动作带上正确的轮次
        let invocation_id = match &event.invocation_id {
            Some(id) => {
                self.store.set_invocation_id(&run_id, id).await;
                Some(id.clone())
            }
            None => self
                .store
                .get(&run_id)
                .await
                .and_then(|state| state.invocation_id),
        };

        let mut chunks = Vec::new();
        for part in &event.parts {
            match part {
                Part::Text { text } => {
                    if let Some(chunk) = self.on_text(text, event.partial == Some(true)) {
                        chunks.push(chunk);
                    }
                }
                Part::ToolCall(call) if call.name == REQUEST_CONFIRMATION_TOOL => {
                    if let Some(chunk) = self.on_confirmation(call, &invocation_id).await {
                        chunks.push(chunk);
                    }
                }
                Part::ToolCall(call) => {
                    chunks.push(self.on_tool_call(call, &invocation_id).await);
                }
                Part::ToolResponse(response) => {
                    if let Some(chunk) = self.on_tool_response(event, response) {
                        chunks.push(chunk);
                    }
                }
            }
        }
        chunks
    }

    /// 引擎调用失败：转为一个 error 流块
    pub fn on_engine_error(&self, err: &HiveError) -> StreamChunk {
        let message = match err {
            HiveError::Engine(message) => message.clone(),
            other => other.to_string(),
        };
        self.factory.error(message, err.code())
    }

    fn on_text(&mut self, text: &str, partial: bool) -> Option<StreamChunk> {
        if text.is_empty() {
            return None;
        }
        let delta = if partial {
            text
        } else {
            text.strip_prefix(self.text_accumulator.as_str())
                .unwrap_or(text)
        };
        self.text_accumulator.push_str(delta);
        Some(self.factory.content(self.text_accumulator.clone(), delta))
    }

    async fn on_confirmation(
        &mut self,
        call: &ToolCall,
        invocation_id: &Option<String>,
    ) -> Option<StreamChunk> {
        let original = call
            .args
            .as_ref()
            .and_then(|args| args.get("originalFunctionCall"));
        let tool_call_id = original
            .and_then(|o| o.get("id"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let tool_name = original
            .and_then(|o| o.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        let (Some(tool_call_id), Some(tool_name)) = (tool_call_id, tool_name) else {
            tracing::debug!(
                run_id = self.run_id(),
                confirmation_id = ?call.id,
                "Dropping confirmation request without original call identity"
            );
            return None;
        };
        let tool_input = original
            .and_then(|o| o.get("args"))
            .cloned()
            .unwrap_or(Value::Null);

        let run_id = self.factory.run_id();
        // 审批优先：同 ID 的客户端工具在批准前不算待执行，批准后由编排器重新登记
        if self
            .store
            .pop_pending_client_tool(run_id, tool_call_id)
            .await
            .is_some()
        {
            tracing::debug!(run_id, tool_call_id, "Client tool parked behind approval");
        }
        self.store
            .add_pending_approval(
                run_id,
                PendingAction::approval(
                    tool_call_id,
                    tool_name,
                    tool_input.clone(),
                    invocation_id.clone(),
                    call.id.clone(),
                ),
            )
            .await;
        tracing::info!(run_id, tool_call_id, tool_name, "Approval requested");

        Some(
            self.factory
                .approval_requested(tool_call_id, tool_name, tool_input),
        )
    }

    async fn on_tool_call(
        &mut self,
        call: &ToolCall,
        invocation_id: &Option<String>,
    ) -> StreamChunk {
        let tool_call_id = call
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_tool_call_id);
        let tool_input = call
            .args
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));

        // 先登记再发出，保证并发到达的续跑载荷一定能找到该动作
        if self.client_tools.contains(&call.name) {
            let run_id = self.factory.run_id();
            // 已在等待审批：批准后由编排器登记
            if self
                .store
                .get_pending_approval(run_id, &tool_call_id)
                .await
                .is_some()
            {
                tracing::debug!(run_id, tool_call_id, "Client tool parked behind approval");
            } else {
                self.store
                    .add_pending_client_tool(
                        run_id,
                        PendingAction::client_tool(
                            tool_call_id.clone(),
                            call.name.clone(),
                            tool_input.clone(),
                            invocation_id.clone(),
                        ),
                    )
                    .await;
            }
        }

        let arguments = canonical_json(&tool_input);
        let index = self.next_tool_call_index();
        self.factory
            .tool_call(index, tool_call_id, call.name.clone(), arguments)
    }

    fn on_tool_response(&self, event: &RunEvent, response: &ToolResponse) -> Option<StreamChunk> {
        if response.name == REQUEST_CONFIRMATION_TOOL {
            return None;
        }
        if let Some(id) = &response.id {
            if event.resolved_confirmations.contains(id) {
                return None;
            }
        }
        let content = extract_tool_result_content(response.response.as_ref()?);
        Some(
            self.factory
                .tool_result(response.id.clone().unwrap_or_default(), content),
        )
    }

    fn next_tool_call_index(&mut self) -> u32 {
        let index = self.tool_call_index;
        self.tool_call_index += 1;
        index
    }
}

fn generate_tool_call_id() -> String {
    format!("tool_{}", uuid::Uuid::new_v4().simple())
}

/// 规范化 JSON 文本（对象键有序）
fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// 工具结果展示文本：依次取 output / result / response 字段，否则整体；字符串原样，其余序列化
pub fn extract_tool_result_content(response: &Value) -> String {
    let value = RESULT_FIELDS
        .iter()
        .find_map(|field| response.get(*field))
        .unwrap_or(response);
    match value {
        Value::String(s) => s.clone(),
        other => canonical_json(other),
    }
}
