//! 核心编排层：错误类型与 Run 主控循环

pub mod error;
pub mod orchestrator;

pub use error::HiveError;
pub use orchestrator::{ChunkSender, RunOrchestrator, RunOutcome, RunSession};
