//! Hive Web 服务
//!
//! 启动: cargo run --bin hive-web --features web
//! 默认监听 0.0.0.0:8000，可用 HIVE__SERVER__PORT 覆盖

#![cfg(feature = "web")]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use hive::config::load_config;
use hive::continuation::ContinuationHub;
use hive::engine::MockEngine;
use hive::server::{serve, AppState};
use hive::store::create_run_store;
use hive::RunOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("failed to load config")?;

    let store = create_run_store(&cfg.store)?;
    let client_tools = Arc::new(cfg.tools.client_tool_registry());
    tracing::info!(
        app = %cfg.app.name,
        model = %cfg.app.model,
        client_tools = ?client_tools.tool_names(),
        "Starting"
    );

    let orchestrator = RunOrchestrator::new(
        Arc::new(MockEngine::new()),
        store,
        Arc::new(ContinuationHub::new()),
        client_tools,
        cfg.app.model.clone(),
    );
    let state = Arc::new(AppState::new(
        Arc::new(orchestrator),
        cfg.server.keepalive_secs,
    ));

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| {
            format!("invalid listen address {}:{}", cfg.server.host, cfg.server.port)
        })?;
    serve(state, addr).await?;
    Ok(())
}
