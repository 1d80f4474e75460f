//! Mock KMS plugin - Main entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mock_kms_service::{parse_duration, PluginService, ServiceConfig, DEFAULT_LISTEN_ADDR};

#[derive(Parser, Debug)]
#[command(name = "mock-kms-plugin")]
#[command(about = "KMS plugin test double - identity encryption with simulated latency")]
#[command(version)]
struct Cli {
    /// gRPC listen address
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR, env = "MOCK_KMS_LISTEN_ADDR")]
    listen_addr: String,

    /// gRPC connection timeout
    #[arg(long, default_value = "5s", value_parser = parse_duration, env = "MOCK_KMS_TIMEOUT")]
    timeout: Duration,

    /// Decryption latency min
    #[arg(long, default_value = "0s", value_parser = parse_duration, env = "MOCK_KMS_DECRYPTION_LATENCY_MIN")]
    decryption_latency_min: Duration,

    /// Decryption latency max
    #[arg(long, default_value = "0s", value_parser = parse_duration, env = "MOCK_KMS_DECRYPTION_LATENCY_MAX")]
    decryption_latency_max: Duration,

    /// Encryption latency min
    #[arg(long, default_value = "0s", value_parser = parse_duration, env = "MOCK_KMS_ENCRYPTION_LATENCY_MIN")]
    encryption_latency_min: Duration,

    /// Encryption latency max
    #[arg(long, default_value = "0s", value_parser = parse_duration, env = "MOCK_KMS_ENCRYPTION_LATENCY_MAX")]
    encryption_latency_max: Duration,

    /// Time allowed for in-flight requests to drain before a forced stop
    #[arg(long, default_value = "30s", value_parser = parse_duration, env = "MOCK_KMS_SHUTDOWN_GRACE_PERIOD")]
    shutdown_grace_period: Duration,
}

impl Cli {
    fn service_config(&self) -> Result<ServiceConfig> {
        ServiceConfig::from_bounds(
            &self.listen_addr,
            self.timeout,
            (self.encryption_latency_min, self.encryption_latency_max),
            (self.decryption_latency_min, self.decryption_latency_max),
        )
        .context("invalid plugin configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.service_config()?;
    let service = Arc::new(PluginService::new(config));

    tracing::info!(listen_addr = %cli.listen_addr, "starting server");
    let mut serving = tokio::spawn({
        let service = service.clone();
        async move { service.start().await }
    });

    tokio::select! {
        result = &mut serving => {
            result
                .context("plugin service task failed")?
                .context("failed to serve")?;
            return Ok(());
        }
        result = shutdown_signal() => result?,
    }

    tracing::info!("shutting down server");
    if tokio::time::timeout(cli.shutdown_grace_period, service.graceful_stop())
        .await
        .is_err()
    {
        tracing::warn!(
            grace_period = ?cli.shutdown_grace_period,
            "in-flight requests did not drain, forcing stop"
        );
        service.force_stop().await;
    }

    serving
        .await
        .context("plugin service task failed")?
        .context("failed to serve")?;

    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for SIGINT")?,
        _ = terminate.recv() => {},
    }

    tracing::info!("received shutdown signal");
    Ok(())
}

/// Resolves when the process receives ctrl-c.
#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("received shutdown signal");
    Ok(())
}
