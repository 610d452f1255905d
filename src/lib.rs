//! Hive - 智能体事件翻译与人机协同（HITL）续跑引擎
//!
//! 把智能体引擎的事件流翻译为前端可渲染的流块协议；当引擎请求人工审批或请求在客户端执行工具时，
//! 暂停 Run，等待外部投递决策，再把决策合成为引擎输入继续执行。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **continuation**: 续跑载荷与按 run_id 的会合中心
//! - **core**: 错误类型与 Run 编排主循环
//! - **engine**: 引擎抽象（事件模型、调用接口）与 Mock 实现
//! - **observability**: tracing 初始化
//! - **protocol**: 对外流块、SSE 编码、请求体解析
//! - **server**: axum HTTP 传输层（feature = "web"）
//! - **store**: 待决动作存储
//! - **tools**: 客户端工具注册表
//! - **translator**: 引擎事件 -> 流块 翻译器

pub mod config;
pub mod continuation;
pub mod core;
pub mod engine;
pub mod observability;
pub mod protocol;
#[cfg(feature = "web")]
pub mod server;
pub mod store;
pub mod tools;
pub mod translator;

pub use crate::core::{HiveError, RunOrchestrator, RunOutcome};
pub use continuation::{ContinuationHub, ContinuationPayload};
pub use translator::EventTranslator;
