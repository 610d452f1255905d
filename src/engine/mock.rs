//! Mock 引擎（用于测试与本地演示，无需真实智能体）
//!
//! - MockEngine：回显用户最后一条消息，便于本地跑通流式链路。
//! - ScriptedEngine：按调用顺序回放预设事件脚本，并记录每次调用的输入，供测试断言。

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use super::{AgentEngine, EngineInput, RunEvent, RunEventStream};
use crate::core::HiveError;

/// 流式回显时每段字符数
const CHUNK_CHARS: usize = 8;

/// Mock 引擎：回显用户文本
#[derive(Debug, Default)]
pub struct MockEngine {
    sessions: Mutex<HashSet<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_session(&self, run_id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(run_id)
    }
}

#[async_trait]
impl AgentEngine for MockEngine {
    async fn start_or_get_session(&self, run_id: &str) -> Result<(), HiveError> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(run_id.to_string());
        Ok(())
    }

    async fn invoke(
        &self,
        run_id: &str,
        input: EngineInput,
        invocation_id: Option<String>,
    ) -> Result<RunEventStream, HiveError> {
        if !self.has_session(run_id) {
            return Err(HiveError::Session(format!("no session for run {}", run_id)));
        }
        let invocation_id =
            invocation_id.unwrap_or_else(|| format!("inv_{}", uuid::Uuid::new_v4().simple()));
        let reply = match input {
            EngineInput::UserText { text } => format!("Echo from Mock: {}", text),
            EngineInput::ToolResponses { responses } => {
                format!("Received {} tool response(s).", responses.len())
            }
        };

        let chars: Vec<char> = reply.chars().collect();
        let mut events: Vec<Result<RunEvent, HiveError>> = chars
            .chunks(CHUNK_CHARS)
            .map(|c| {
                Ok(RunEvent::new(invocation_id.clone())
                    .partial(true)
                    .text(c.iter().collect::<String>()))
            })
            .collect();
        events.push(Ok(RunEvent::new(invocation_id).partial(false).text(reply)));
        Ok(Box::pin(stream::iter(events)))
    }
}

/// 一次引擎调用的记录
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedInvocation {
    pub run_id: String,
    pub input: EngineInput,
    pub invocation_id: Option<String>,
}

/// 脚本的一步：对应一次 invoke
#[derive(Debug)]
enum ScriptStep {
    Events(Vec<Result<RunEvent, String>>),
    Fail(String),
}

/// 脚本回放引擎：每次 invoke 消费一步；脚本耗尽后返回空事件流
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    steps: Mutex<VecDeque<ScriptStep>>,
    invocations: Mutex<Vec<RecordedInvocation>>,
    sessions: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一次调用要回放的事件
    pub fn push_turn(&self, events: Vec<RunEvent>) -> &Self {
        self.push_step(ScriptStep::Events(events.into_iter().map(Ok).collect()))
    }

    /// 追加一次调用：先回放事件，再在流中途失败
    pub fn push_turn_then_fail(&self, events: Vec<RunEvent>, message: &str) -> &Self {
        let mut items: Vec<Result<RunEvent, String>> = events.into_iter().map(Ok).collect();
        items.push(Err(message.to_string()));
        self.push_step(ScriptStep::Events(items))
    }

    /// 追加一次调用：invoke 本身失败
    pub fn push_invoke_failure(&self, message: &str) -> &Self {
        self.push_step(ScriptStep::Fail(message.to_string()))
    }

    fn push_step(&self, step: ScriptStep) -> &Self {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn sessions(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AgentEngine for ScriptedEngine {
    async fn start_or_get_session(&self, run_id: &str) -> Result<(), HiveError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if !sessions.iter().any(|s| s == run_id) {
            sessions.push(run_id.to_string());
        }
        Ok(())
    }

    async fn invoke(
        &self,
        run_id: &str,
        input: EngineInput,
        invocation_id: Option<String>,
    ) -> Result<RunEventStream, HiveError> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedInvocation {
                run_id: run_id.to_string(),
                input,
                invocation_id,
            });

        let step = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match step {
            Some(ScriptStep::Fail(message)) => Err(HiveError::Engine(message)),
            Some(ScriptStep::Events(items)) => {
                let items: Vec<Result<RunEvent, HiveError>> = items
                    .into_iter()
                    .map(|r| r.map_err(HiveError::Engine))
                    .collect();
                Ok(Box::pin(stream::iter(items)))
            }
            None => Ok(Box::pin(stream::empty())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_mock_engine_echo_accumulates() {
        let engine = MockEngine::new();
        engine.start_or_get_session("run-1").await.unwrap();
        let mut events = engine
            .invoke(
                "run-1",
                EngineInput::UserText {
                    text: "hello there".to_string(),
                },
                None,
            )
            .await
            .unwrap();

        let mut last = None;
        while let Some(ev) = events.next().await {
            last = Some(ev.unwrap());
        }
        let last = last.unwrap();
        assert_eq!(last.partial, Some(false));
        assert!(matches!(
            &last.parts[0],
            super::super::Part::Text { text } if text == "Echo from Mock: hello there"
        ));
    }

    #[tokio::test]
    async fn test_mock_engine_requires_session() {
        let engine = MockEngine::new();
        let result = engine
            .invoke(
                "run-x",
                EngineInput::UserText {
                    text: "hi".to_string(),
                },
                None,
            )
            .await;
        assert!(matches!(result, Err(HiveError::Session(_))));
    }

    #[tokio::test]
    async fn test_scripted_engine_replays_in_order() {
        let engine = ScriptedEngine::new();
        engine
            .push_turn(vec![RunEvent::new("inv-1").text("a")])
            .push_invoke_failure("down");

        let input = EngineInput::UserText {
            text: "q".to_string(),
        };
        let first: Vec<_> = engine
            .invoke("r", input.clone(), None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(first.len(), 1);
        assert!(engine.invoke("r", input.clone(), Some("inv-1".into())).await.is_err());

        let empty: Vec<_> = engine.invoke("r", input, None).await.unwrap().collect().await;
        assert!(empty.is_empty());
        assert_eq!(engine.invocations().len(), 3);
        assert_eq!(engine.invocations()[1].invocation_id.as_deref(), Some("inv-1"));
    }
}
