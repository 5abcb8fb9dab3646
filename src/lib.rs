//! Live preview agent library.
//!
//! A background agent and short-lived clients on one machine exchange typed
//! events over a local broadcast channel. The agent watches project sources
//! and rebuilds previews when a file changes. It handles:
//! - Cross-process event bus with acknowledgments and liveness probes
//! - Debounced, cancellable preview builds with a per-file result cache
//! - Access checks and one watcher per project root
//!
//! # Architecture
//!
//! - `bus`: Envelopes, routing, acknowledgments and transports
//! - `runtime`: Preview context, cache, build tasks, orchestrator and agent
//! - `tools`: Filesystem scanner, build tool process and directory watcher
//! - `client`: Preview board and client-side event tracking
//! - `config`: Environment configuration

pub mod bus;
pub mod client;
pub mod config;
pub mod runtime;
pub mod tools;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use bus::{BusError, BusRole, EventBus, SocketTransport};
use config::{AgentConfig, ConfigError};
use runtime::Agent;
use tools::{ProcessBuildTool, SourcePreviewScanner};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Bus(#[from] BusError),
    #[error("{0}")]
    Other(String),
}

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livepreview=debug,info".parse().expect("valid env filter")),
        )
        .try_init();
}

/// Open the shared channel for this machine with the given role.
pub async fn connect_bus(config: &AgentConfig, role: BusRole) -> Result<Arc<EventBus>, AppError> {
    let transport = SocketTransport::connect(&config.channel, Some(config.port())).await?;
    let bus = Arc::new(EventBus::new(Arc::new(transport), role)?.with_ack_timeout(config.ack_timeout));
    bus.start();
    Ok(bus)
}

/// Run the agent until Ctrl-C.
pub async fn run_agent() -> Result<(), AppError> {
    init_tracing();
    let config = AgentConfig::from_env()?;
    let bus = connect_bus(&config, BusRole::Agent).await?;

    let scanner = SourcePreviewScanner::new(config.source_root.clone());
    let agent = Agent::new(
        config,
        bus,
        Arc::new(ProcessBuildTool::new()),
        Arc::new(scanner),
    );
    agent.attach()?;
    tracing::info!("agent ready");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::Other(format!("failed to wait for Ctrl-C: {e}")))?;
    tracing::info!("shutting down");
    agent.shutdown()?;
    // Give the transport a moment to flush the goodbye.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    Ok(())
}
