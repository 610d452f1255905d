//! SSE 帧编码：每个流块一条 `data: <json>\n\n`，流以 `data: [DONE]\n\n` 收尾

use super::StreamChunk;
use crate::core::HiveError;

/// 流结束哨兵
pub const DONE_SENTINEL: &str = "[DONE]";

/// 将流块编码为一条 SSE 记录
pub fn encode_chunk(chunk: &StreamChunk) -> Result<String, HiveError> {
    let payload = serde_json::to_string(chunk)?;
    Ok(format!("data: {}\n\n", payload))
}

/// 流结束记录
pub fn encode_done() -> String {
    format!("data: {}\n\n", DONE_SENTINEL)
}
