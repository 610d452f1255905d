//! 工具：客户端执行工具的注册表

pub mod registry;

pub use registry::ClientToolRegistry;
