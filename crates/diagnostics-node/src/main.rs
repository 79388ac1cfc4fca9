// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Diagnostics Node
//!
//! Samples synthetic sensors at 10 Hz, detects statistical anomalies,
//! and reliably streams telemetry to a diagnostics host over a
//! long-lived TCP connection, surviving disconnects via a local
//! write-ahead log.
//!
//! # Usage
//!
//! ```bash
//! diagnostics-node --id node-a --host 127.0.0.1 --port 9000
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod anomaly;
mod config;
mod link;
mod node;
mod ring;
mod sampler;
mod wal;

use config::NodeConfig;
use node::NodeShared;
use wal::Wal;

/// Diagnostics Node - samples, detects anomalies, streams telemetry
#[derive(Parser, Debug)]
#[command(name = "diagnostics-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stable node identifier, immutable for this process's lifetime
    #[arg(long)]
    id: String,

    /// Host address to connect to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Host port to connect to
    #[arg(long, default_value = "9000")]
    port: u16,

    /// Working directory for the write-ahead log
    #[arg(long, default_value = "./node_data")]
    workdir: PathBuf,

    /// Configuration file (JSON format), overrides CLI defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the synthetic signal generator (unseeded by default)
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
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
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install log subscriber");
    }

    let node_config = match &args.config {
        Some(path) => match NodeConfig::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("failed to load config from {:?}: {e}", path);
                return ExitCode::FAILURE;
            }
        },
        None => NodeConfig::default(),
    };
    if let Err(e) = node_config.validate() {
        error!("invalid config: {e}");
        return ExitCode::FAILURE;
    }

    let wal = match Wal::open(&args.workdir, &args.id).await {
        Ok(w) => w,
        Err(e) => {
            error!("fatal: could not open WAL under {:?}: {e}", args.workdir);
            return ExitCode::FAILURE;
        }
    };

    info!("+----------------------------------------------------+");
    info!("|             Diagnostics Node v{}             |", env!("CARGO_PKG_VERSION"));
    info!("+----------------------------------------------------+");
    info!("|  id:      {:40} |", args.id);
    info!("|  host:    {:40} |", format!("{}:{}", args.host, args.port));
    info!("|  workdir: {:40} |", args.workdir.display());
    info!("+----------------------------------------------------+");

    let shared = Arc::new(NodeShared::new(args.id.clone(), wal, node_config));
    let shutdown = CancellationToken::new();

    let seed = args.seed;
    let host = args.host.clone();
    let port = args.port;

    let sample_shutdown = shutdown.clone();
    let sample_shared = shared.clone();
    let sample_task = tokio::spawn(async move {
        sampler::run(sample_shared, sample_shutdown, seed).await;
    });

    let link_shutdown = shutdown.clone();
    let link_shared = shared.clone();
    let link_task = tokio::spawn(async move {
        link::run(link_shared, host, port, link_shutdown).await;
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");

    // Cancelling stops new samples immediately; the tx/rx task still
    // gets one more pass over the ring and WAL before it returns.
    shutdown.cancel();
    let _ = sample_task.await;
    let _ = link_task.await;

    info!("diagnostics-node stopped");
    ExitCode::SUCCESS
}
