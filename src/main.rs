//! ironbnc - a persistent IRC bouncer.
//!
//! Keeps one always-on connection per account to an IRC server and lets
//! transient clients attach and detach without dropping presence.

mod bouncer;
mod config;
mod error;
mod hooks;
mod log;
mod network;
mod security;
mod user;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::bouncer::Bouncer;
use crate::config::Config;
use crate::network::{TcpConnector, run_listener};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ironbnc.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "failed to load config");
        e
    })?;
    let config = Arc::new(config);

    info!(
        listen = %config.server.listen,
        data_dir = %config.server.data_dir.display(),
        "starting ironbnc"
    );

    let bouncer = Bouncer::new(config.clone(), Arc::new(TcpConnector));
    let loaded = bouncer.load_users()?;
    info!(users = loaded, "accounts loaded");

    bouncer.spawn_maintenance();

    let listener = TcpListener::bind(&config.server.listen).await?;
    tokio::select! {
        result = run_listener(listener, bouncer.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            bouncer.shutdown("Shutting down");
            Ok(())
        }
    }
}
