// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tx/rx state machine owning the node's single outbound connection.
//!
//! Disconnected → Replaying → Streaming, with any I/O error sending the
//! machine back to Disconnected. This task is the sole reader/writer of
//! the connection and the sole writer of `high_acked` and `config`.

use crate::node::NodeShared;
use diagnostics_proto::{
    codec::{read_frame, write_frame, ReadOutcome},
    AckFrame, ConfigAppliedFrame, Frame, TelemetryRecord,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const ACK_DEADLINE: Duration = Duration::from_millis(500);
const INNER_READ_TIMEOUT: Duration = Duration::from_millis(50);
const STREAMING_IDLE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub enum LinkError {
    Io(io::Error),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        LinkError::Io(e)
    }
}

enum DrainResult {
    Acked,
    TimedOut,
}

/// Runs the tx/rx loop until `shutdown` is cancelled, at which point it
/// performs one best-effort drain pass and returns.
pub async fn run(shared: Arc<NodeShared>, host: String, port: u16, shutdown: CancellationToken) {
    let mut backoff = INITIAL_BACKOFF;
    // None means nothing acked yet; the wire's ack_seq uses -1 for the
    // same state.
    let mut high_acked: Option<u64> = None;

    loop {
        if shutdown.is_cancelled() {
            info!("tx/rx loop stopping before reconnect");
            return;
        }

        let stream = match TcpStream::connect((host.as_str(), port)).await {
            Ok(s) => s,
            Err(e) => {
                warn!("connect to {host}:{port} failed: {e}; retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.cancelled() => return,
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };
        backoff = INITIAL_BACKOFF;
        info!("connected to {host}:{port}");

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = write_half;

        match replay_then_stream(&shared, &mut reader, &mut writer, &mut high_acked, &shutdown)
            .await
        {
            Ok(()) => {
                info!("tx/rx loop stopping after final drain");
                return;
            }
            Err(e) => {
                warn!("connection to {host}:{port} lost: {e}");
            }
        }
    }
}

async fn replay_then_stream(
    shared: &Arc<NodeShared>,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    high_acked: &mut Option<u64>,
    shutdown: &CancellationToken,
) -> Result<(), LinkError> {
    // Replaying: walk the WAL once, oldest to newest.
    let wal_records = shared.wal.lock().await.read_all().await?;
    for record in wal_records {
        if should_send(record.seq, *high_acked) {
            send_and_drain(shared, reader, writer, &record, high_acked).await?;
        }
    }
    debug!("replay complete, high_acked={:?}", high_acked);

    // Streaming: repeatedly scan the ring. Checked at the top of every
    // pass (not just the idle branch) so a host that keeps accepting
    // data but never acks can't keep this loop sending forever after
    // shutdown is requested.
    loop {
        let shutting_down = shutdown.is_cancelled();

        let snapshot: Vec<TelemetryRecord> = {
            let ring = shared.ring.lock().expect("ring mutex poisoned");
            ring.iter().cloned().collect()
        };

        let mut sent_any = false;
        for record in &snapshot {
            if should_send(record.seq, *high_acked) {
                send_and_drain(shared, reader, writer, record, high_acked).await?;
                sent_any = true;
            }
        }

        if shutting_down {
            return Ok(());
        }

        if !sent_any {
            tokio::select! {
                _ = tokio::time::sleep(STREAMING_IDLE_SLEEP) => {}
                _ = shutdown.cancelled() => return Ok(()),
            }
        }
    }
}

fn should_send(seq: u64, high_acked: Option<u64>) -> bool {
    match high_acked {
        Some(acked) => seq > acked,
        None => true,
    }
}

async fn send_and_drain(
    shared: &Arc<NodeShared>,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    record: &TelemetryRecord,
    high_acked: &mut Option<u64>,
) -> Result<DrainResult, LinkError> {
    write_frame(writer, &Frame::Telemetry(record.clone())).await?;

    let deadline = Instant::now() + ACK_DEADLINE;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(DrainResult::TimedOut);
        }
        let budget = remaining.min(INNER_READ_TIMEOUT);

        match tokio::time::timeout(budget, read_frame(reader)).await {
            Err(_elapsed) => continue, // inner timeout; loop re-checks outer deadline
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(ReadOutcome::Closed)) => {
                return Err(LinkError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "host closed connection during drain-for-ack",
                )))
            }
            Ok(Ok(ReadOutcome::Dropped)) => continue,
            Ok(Ok(ReadOutcome::Frame(Frame::Ack(AckFrame { ack_seq })))) => {
                if ack_seq >= 0 {
                    let ack_seq = ack_seq as u64;
                    let advanced = high_acked.map(|h| ack_seq > h).unwrap_or(true);
                    if advanced {
                        *high_acked = Some(ack_seq);
                        if let Err(e) = shared.wal.lock().await.compact_up_to(ack_seq).await {
                            warn!("WAL compaction up to {ack_seq} failed: {e}");
                        }
                    }
                }
                return Ok(DrainResult::Acked);
            }
            Ok(Ok(ReadOutcome::Frame(Frame::ConfigUpdate(update)))) => {
                apply_config_update(shared, writer, &update).await?;
                continue;
            }
            Ok(Ok(ReadOutcome::Frame(_other))) => continue,
        }
    }
}

async fn apply_config_update(
    shared: &Arc<NodeShared>,
    writer: &mut OwnedWriteHalf,
    update: &diagnostics_proto::ConfigUpdateFrame,
) -> Result<(), LinkError> {
    {
        let mut cfg = shared.config.lock().expect("config mutex poisoned");
        cfg.apply_patch(&update.config);
    }
    info!(
        "applied config_update cfg_version={} -> {:?}",
        update.cfg_version, update.config
    );

    let applied = Frame::ConfigApplied(ConfigAppliedFrame {
        node_id: shared.node_id.clone(),
        cfg_version_applied: update.cfg_version,
        ts_wall_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64,
    });
    write_frame(writer, &applied).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_send_treats_absent_watermark_as_send_everything() {
        assert!(should_send(0, None));
        assert!(should_send(100, None));
    }

    #[test]
    fn should_send_only_above_watermark() {
        assert!(!should_send(5, Some(5)));
        assert!(should_send(6, Some(5)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = INITIAL_BACKOFF;
        let mut seen = vec![b];
        for _ in 0..6 {
            b = (b * 2).min(MAX_BACKOFF);
            seen.push(b);
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }
}
