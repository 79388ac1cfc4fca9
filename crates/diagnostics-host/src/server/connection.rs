// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection telemetry intake.
//!
//! One task per accepted connection. State starts fresh every time: no
//! cross-connection memory of `high_ack` or `node_id` is kept, even for
//! repeat connections from the same node.

use crate::config::ServerConfig;
use diagnostics_proto::{
    codec::{read_frame, write_frame, ReadOutcome},
    AckFrame, ConfigPatch, ConfigUpdateFrame, Frame,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum ConnectionError {
    Io(io::Error),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

/// Per-connection state: `high_ack` starts at "nothing acked", `node_id`
/// is latched from the first telemetry frame observed.
struct ConnectionState {
    high_ack: Option<u64>,
    node_id: Option<String>,
    last_cfg_push: Instant,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            high_ack: None,
            node_id: None,
            // First push is still gated by push_config_every_s from connect time.
            last_cfg_push: Instant::now(),
        }
    }
}

/// Runs the per-connection handler until the stream closes or a fault
/// injection closes it early.
pub async fn handle(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: &ServerConfig,
    logdir: &PathBuf,
) -> Result<(), ConnectionError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut state = ConnectionState::new();
    let mut rng = StdRng::from_entropy();

    loop {
        let outcome = read_frame(&mut reader).await?;
        let frame = match outcome {
            ReadOutcome::Closed => {
                debug!("connection from {peer_addr} closed");
                return Ok(());
            }
            ReadOutcome::Dropped => continue,
            ReadOutcome::Frame(f) => f,
        };

        if config.faults_enabled {
            if config.ack_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.ack_delay_ms)).await;
            }
            if config.drop_prob > 0.0 && rng.gen::<f64>() < config.drop_prob {
                info!("fault injection: dropping connection from {peer_addr}");
                return Ok(());
            }
        }

        let record = match frame {
            Frame::Telemetry(record) => record,
            // Anything else arriving from a node is ignored, keeping the
            // wire format forward-compatible with frame kinds this
            // version doesn't recognize.
            _ => continue,
        };

        if state.node_id.is_none() {
            state.node_id = Some(record.node_id.clone());
        }
        append_to_log(logdir, &record.node_id, &record).await?;

        if state.high_ack.map(|h| record.seq > h).unwrap_or(true) {
            state.high_ack = Some(record.seq);
        }

        if config.push_config_every_s > 0.0
            && state.last_cfg_push.elapsed() >= Duration::from_secs_f64(config.push_config_every_s)
        {
            push_config_update(&mut write_half, &mut rng).await?;
            state.last_cfg_push = Instant::now();
        }

        let ack = Frame::Ack(AckFrame {
            ack_seq: state.high_ack.map(|h| h as i64).unwrap_or(-1),
        });
        write_frame(&mut write_half, &ack).await?;
    }
}

async fn append_to_log(
    logdir: &PathBuf,
    node_id: &str,
    record: &diagnostics_proto::TelemetryRecord,
) -> io::Result<()> {
    fs::create_dir_all(logdir).await?;
    let path = logdir.join(format!("{node_id}.jsonl"));
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    let mut line = serde_json::to_vec(record).expect("TelemetryRecord serializes");
    line.push(b'\n');
    file.write_all(&line).await?;
    file.flush().await
}

const CANDIDATE_ANOMALY_Z: [f64; 3] = [2.5, 3.0, 3.5];

async fn push_config_update(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    rng: &mut impl Rng,
) -> io::Result<()> {
    let anomaly_z = CANDIDATE_ANOMALY_Z[rng.gen_range(0..CANDIDATE_ANOMALY_Z.len())];
    let cfg_version = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let update = Frame::ConfigUpdate(ConfigUpdateFrame {
        cfg_version,
        config: ConfigPatch {
            anomaly_z: Some(anomaly_z),
            window: None,
            buffer_max: None,
        },
    });
    write_frame(writer, &update).await?;
    warn!("pushed config_update cfg_version={cfg_version} anomaly_z={anomaly_z}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_starts_with_no_watermark_or_node_id() {
        let state = ConnectionState::new();
        assert_eq!(state.high_ack, None);
        assert_eq!(state.node_id, None);
    }

    #[test]
    fn candidate_anomaly_z_values_are_documented_set() {
        assert_eq!(CANDIDATE_ANOMALY_Z, [2.5, 3.0, 3.5]);
    }
}
