//! cli
//!
//! Command-line interface layer for Modgate.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments
//! - Load the configuration and apply flag overrides
//! - Run the server until SIGINT or SIGTERM
//!
//! The CLI layer is thin. Logging is installed by `main` before [`run`] is
//! called, so everything here can log.

pub mod args;

pub use args::Cli;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::config::Config;
use crate::proxy::ModuleProxy;
use crate::server::ProxyServer;

/// Run the proxy described by `cli`.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    tracing::info!(
        config = %cli.config.display(),
        cache_dir = %config.cache_dir().display(),
        upstream = %config.upstream(),
        patterns = config.patterns().len(),
        pins = config.repositories().len(),
        "configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(serve(cli, config))
}

/// Load the config file and apply flag overrides.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config)?;

    if let Some(upstream) = &cli.upstream {
        config = config.with_upstream(upstream)?;
    }
    if let Some(cache_dir) = &cli.cache_dir {
        config = config.with_cache_dir(cache_dir);
    }

    Ok(config)
}

async fn serve(cli: Cli, config: Config) -> Result<()> {
    let proxy = ModuleProxy::from_config(&config)?;
    let server = Arc::new(
        ProxyServer::new(proxy, config.upstream().clone())?.with_drain_timeout(cli.drain_timeout()),
    );

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        stopper.stop();
    });

    server
        .start(cli.addr)
        .await
        .with_context(|| format!("failed to serve on {}", cli.addr))
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
