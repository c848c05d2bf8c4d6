//! # EchoTrace Hub
//!
//! Entry point for the hub process.
//!
//! ## Startup Sequence
//!
//! 1. Install logging (`RUST_LOG`, default `info`)
//! 2. Load configuration (`ECHOTRACE_CONFIG` file, then env overrides)
//! 3. Open the broker transport (`[broker]`, MQTT by default)
//! 4. Start the runtime
//! 5. Run until Ctrl+C, then shut down gracefully and disconnect

use std::sync::Arc;

use anyhow::{Context, Result};
use hub_runtime::{HubConfig, HubRuntime, HubTransport};
use shared_types::SystemTimeSource;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = HubConfig::from_env().context("Failed to load hub configuration")?;

    let transport = HubTransport::open(&config);
    transport.ready(config.startup_connect_timeout()).await;

    let runtime = HubRuntime::start(config, transport.bus(), Arc::new(SystemTimeSource))
        .await
        .context("Failed to start hub runtime")?;

    info!("Hub is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    transport.close().await;
    Ok(())
}
