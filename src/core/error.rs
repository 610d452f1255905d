//! 运行错误类型
//!
//! 与编排器配合：Engine 类错误在单次调用边界被捕获并转为 error 流块，不会中断整个 Run。

use thiserror::Error;

/// Run 执行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum HiveError {
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// 配置中指定了尚未实现的存储后端
    #[error("Unsupported run store backend: {0}. Only 'memory' is supported.")]
    UnsupportedStore(String),

    #[error("Continuation channel closed for run: {0}")]
    ContinuationClosed(String),
}

impl HiveError {
    /// 流块 error.code 字段；引擎错误不带 code，与上游客户端约定保持一致
    pub fn code(&self) -> Option<&'static str> {
        match self {
            HiveError::Engine(_) => None,
            HiveError::Session(_) => Some("session_error"),
            HiveError::Serialization(_) => Some("serialization_error"),
            HiveError::Config(_) | HiveError::UnsupportedStore(_) => Some("config_error"),
            HiveError::ContinuationClosed(_) => Some("continuation_closed"),
        }
    }
}

impl From<config::ConfigError> for HiveError {
    fn from(e: config::ConfigError) -> Self {
        HiveError::Config(e.to_string())
    }
}
