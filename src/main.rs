//! # pgcast
//!
//! Relay binary: loads settings, installs logging, subscribes to the
//! upstream channel, and serves `WebSocket` clients until a shutdown signal
//! or an upstream failure.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pgcast_core::RelayError;
use pgcast_listener::{NotificationSource, PgNotificationSource, UpstreamError};
use pgcast_logging::LoggingConfig;
use pgcast_server::shutdown::shutdown_signal;
use pgcast_server::{run_relay, RelayServer, ServerConfig};
use pgcast_settings::PgcastSettings;
use tokio::task::JoinError;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay PostgreSQL notifications to `WebSocket` clients.
#[derive(Parser, Debug)]
#[command(name = "pgcast", about = "Relay PostgreSQL notifications to WebSocket clients")]
struct Cli {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Upstream notification channel to relay.
    #[arg(long)]
    channel: Option<String>,

    /// Directory for the rotating log file.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log filter directive, e.g. `info` or `pgcast_server=debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Settings file (defaults to `$PGCAST_SETTINGS` or `~/.pgcast/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Flags override file and environment values.
    fn apply(&self, settings: &mut PgcastSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(channel) = &self.channel {
            settings.upstream.channel.clone_from(channel);
        }
        if let Some(dir) = &self.log_dir {
            settings.logging.directory = Some(dir.to_string_lossy().into_owned());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

/// Log an upstream failure at error level and convert it for exit.
fn upstream_failure(e: impl Into<RelayError>, what: &str) -> anyhow::Error {
    let err: RelayError = e.into();
    error!(error = %err, kind = err.error_kind(), "{what}");
    err.into()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli
        .settings
        .clone()
        .unwrap_or_else(pgcast_settings::settings_path);
    let mut settings = pgcast_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    pgcast_settings::validate(&settings).context("Invalid settings")?;

    let log_guard = pgcast_logging::init_logging(&LoggingConfig::from(&settings.logging))
        .context("Failed to initialize logging")?;
    info!(
        settings_path = %path.display(),
        log_file = ?log_guard.file_path(),
        upstream = ?settings.upstream,
        "starting pgcast"
    );

    let channel = settings.upstream.channel.clone();
    let mut source = PgNotificationSource::connect(&settings.upstream)
        .await
        .map_err(|e| upstream_failure(e, "upstream connection failed"))?;
    let stream = source
        .subscribe(&channel)
        .await
        .map_err(|e| upstream_failure(e, "upstream subscription failed"))?;

    let server = RelayServer::new(ServerConfig::from(&settings.server), channel.as_str());
    let (addr, server_handle) = server.listen().await.context("Failed to start server")?;
    info!(addr = %addr, channel = %channel, "pgcast ready");

    let mut relay = tokio::spawn(run_relay(
        stream,
        Arc::clone(server.broadcaster()),
        server.shutdown().token(),
    ));

    let outcome: Result<(), RelayError> = tokio::select! {
        joined = &mut relay => relay_outcome(joined),
        () = shutdown_signal() => Ok(()),
    };

    info!("shutting down");
    server.shutdown().shutdown();
    if let Err(e) = source.close().await {
        warn!(error = %e, "failed to close upstream subscription");
    }
    let _ = server.close_connections();
    server
        .shutdown()
        .graceful_shutdown(vec![server_handle], Some(SHUTDOWN_TIMEOUT))
        .await;
    relay.abort();

    match outcome {
        Ok(()) => {
            info!("shutdown complete");
            Ok(())
        }
        Err(e) => {
            warn!(kind = e.error_kind(), "exiting after upstream failure");
            Err(e.into())
        }
    }
}

/// Map the relay task's result. A returned `UpstreamError` was already
/// logged by the relay; only a panicked or aborted task is logged here.
fn relay_outcome(joined: Result<Result<(), UpstreamError>, JoinError>) -> Result<(), RelayError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => {
            let err = RelayError::UpstreamSubscription(e.to_string());
            error!(error = %err, kind = err.error_kind(), "relay task failed");
            Err(err)
        }
    }
}
