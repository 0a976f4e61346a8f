//! # courier
//!
//! Courier relay binary: loads settings, wires the relay into the HTTP
//! server and runs until ctrl-c.

#![deny(unsafe_code)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use courier_core::logging::{LogFormat, init_subscriber};
use courier_relay::RelayConfig;
use courier_server::{CourierServer, ServerConfig};
use courier_settings::duration::format_duration;
use courier_settings::load_settings;
use tracing::info;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref()).with_context(|| {
        format!(
            "Failed to load settings from {}",
            cli.config
                .as_deref()
                .map_or_else(|| "environment".into(), |p| p.display().to_string())
        )
    })?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let server_config = ServerConfig::from_settings(&settings);
    let relay_config = RelayConfig::from_settings(&settings);
    info!(
        listen = %server_config.listen,
        timeout = %format_duration(relay_config.timeout),
        cache_ttl = %format_duration(relay_config.cache_ttl),
        delivery = ?relay_config.delivery_mode,
        gate = ?relay_config.gate_mode,
        "starting courier"
    );

    let metrics = courier_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = CourierServer::new(server_config, relay_config).with_metrics(metrics);
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to start server")?;
    info!(%addr, "courier listening");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutdown signal received");

    let report = server
        .shutdown()
        .graceful_shutdown(server.hub(), handle, None)
        .await;
    info!(clean = report.is_clean(), "courier stopped");
    Ok(())
}
