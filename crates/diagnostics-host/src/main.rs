// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Diagnostics Host
//!
//! Accepts connections from diagnostics nodes, persists every received
//! telemetry record to a per-node append-only log, maintains a
//! per-connection acknowledgement watermark, and may push runtime
//! configuration updates.
//!
//! # Usage
//!
//! ```bash
//! diagnostics-host --bind 0.0.0.0 --port 9000
//!
//! # With fault injection for exercising node reconnect/replay
//! diagnostics-host --faults --drop-prob 0.05 --ack-delay-ms 50
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod server;

pub use config::ServerConfig;
pub use server::DiagnosticsHost;

/// Diagnostics Host - accepts node connections and persists telemetry
#[derive(Parser, Debug)]
#[command(name = "diagnostics-host")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// TCP port to listen on
    #[arg(long, default_value = "9000")]
    port: u16,

    /// Directory received telemetry is appended to
    #[arg(long, default_value = "./host_data")]
    logdir: PathBuf,

    /// Configuration file (JSON format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable fault-injection knobs below (drop-prob, ack-delay-ms)
    #[arg(long, default_value = "false")]
    faults: bool,

    /// Per-frame probability of dropping the connection (requires --faults)
    #[arg(long, default_value = "0.0")]
    drop_prob: f64,

    /// Fixed per-frame ingress delay in milliseconds (requires --faults)
    #[arg(long, default_value = "0")]
    ack_delay_ms: u64,

    /// Seconds between unsolicited config_update pushes; 0 disables
    #[arg(long, default_value = "0.0")]
    push_config_every_s: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = if let Some(config_path) = args.config {
        info!("loading config from {:?}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            logdir: args.logdir.display().to_string(),
            faults_enabled: args.faults,
            drop_prob: args.drop_prob,
            ack_delay_ms: args.ack_delay_ms,
            push_config_every_s: args.push_config_every_s,
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;

    info!("+----------------------------------------------------+");
    info!("|             Diagnostics Host v{}              |", env!("CARGO_PKG_VERSION"));
    info!("+----------------------------------------------------+");
    info!("|  bind:   {:40} |", addr);
    info!("|  logdir: {:40} |", config.logdir);
    info!(
        "|  faults: {:40} |",
        if config.faults_enabled { "enabled" } else { "disabled" }
    );
    info!("+----------------------------------------------------+");

    let host = DiagnosticsHost::new(config)?;

    let host_handle = host.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received, stopping host...");
        host_handle.shutdown();
    });

    host.run().await?;

    info!("diagnostics host stopped");
    Ok(())
}
