//! 客户端请求体解析：用户文本提取与 run_id 解析

use serde_json::Value;

/// 取最近一条 user 消息的文本。
/// content 为字符串时直接 trim；为分段数组时拼接所有 type = "text" 的段；结果为空返回 None。
pub fn extract_user_text(messages: &[Value]) -> Option<String> {
    let text = messages
        .iter()
        .rev()
        .filter(|m| m.get("role").and_then(Value::as_str) == Some("user"))
        .find_map(|m| match m.get("content")? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Array(parts) => Some(
                parts
                    .iter()
                    .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|p| p.get("content").and_then(Value::as_str))
                    .collect::<String>()
                    .trim()
                    .to_string(),
            ),
            _ => None,
        })?;

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 解析请求体中的 run_id：顶层 run_id > data.run_id > 新生成
pub fn resolve_run_id(body: &Value) -> String {
    body.get("run_id")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/data/run_id").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_latest_user_string() {
        let messages = vec![
            json!({"role": "user", "content": "first"}),
            json!({"role": "assistant", "content": "reply"}),
            json!({"role": "user", "content": "  show me yesterday's errors  "}),
        ];
        assert_eq!(
            extract_user_text(&messages).as_deref(),
            Some("show me yesterday's errors")
        );
    }

    #[test]
    fn test_extract_text_parts() {
        let messages = vec![json!({
            "role": "user",
            "content": [
                {"type": "text", "content": "hello "},
                {"type": "image", "content": "ignored"},
                {"type": "text", "content": "world"}
            ]
        })];
        assert_eq!(extract_user_text(&messages).as_deref(), Some("hello world"));
    }

    #[test]
    fn test_extract_empty_is_none() {
        assert_eq!(extract_user_text(&[]), None);
        assert_eq!(
            extract_user_text(&[json!({"role": "user", "content": "   "})]),
            None
        );
        assert_eq!(
            extract_user_text(&[json!({"role": "assistant", "content": "hi"})]),
            None
        );
    }

    #[test]
    fn test_resolve_run_id_precedence() {
        assert_eq!(resolve_run_id(&json!({"run_id": "a", "data": {"run_id": "b"}})), "a");
        assert_eq!(resolve_run_id(&json!({"data": {"run_id": "b"}})), "b");
        let generated = resolve_run_id(&json!({}));
        assert_eq!(generated.len(), 32);
    }
}
