// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-cadence sample loop.
//!
//! Runs at 10 Hz. `seq` restarts at 0 on every process start; the host
//! tolerates this since it treats its per-node log as an at-least-once,
//! non-deduplicated transcript rather than a unique-key store.

use crate::anomaly::AnomalyDetector;
use crate::node::NodeShared;
use diagnostics_proto::{Diagnostics, TelemetryRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const PERIOD: Duration = Duration::from_millis(100);

/// Deterministic-when-seeded synthetic signal generator.
struct SignalGenerator {
    rng: StdRng,
}

impl SignalGenerator {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    fn sample(&mut self) -> (f64, f64, f64) {
        let temp_noise = Normal::new(0.0, 0.1).unwrap().sample(&mut self.rng);
        let step = if self.rng.gen::<f64>() < 0.01 { 0.5 } else { 0.0 };
        let temp_c = 25.0 + temp_noise + step;

        let hum_noise = Normal::new(0.0, 0.15).unwrap().sample(&mut self.rng);
        let hum_pct = 40.0 + hum_noise;

        let vib_noise: f64 = Normal::new(0.0, 0.02).unwrap().sample(&mut self.rng);
        let vib_g = 0.1 + vib_noise.abs();

        (temp_c, hum_pct, vib_g)
    }

    /// 98% healthy; otherwise a low-rail fault.
    fn diagnostics(&mut self) -> Diagnostics {
        if self.rng.gen::<f64>() > 0.02 {
            Diagnostics {
                diag_ok: true,
                diag_reason: String::new(),
            }
        } else {
            Diagnostics {
                diag_ok: false,
                diag_reason: "rail_low".into(),
            }
        }
    }
}

fn round_to(x: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (x * factor).round() / factor
}

/// Runs the sample loop until `shutdown` is cancelled.
///
/// On shutdown, no further samples are produced; the caller is expected
/// to let the tx/rx task drain once more afterward.
pub async fn run(shared: Arc<NodeShared>, shutdown: CancellationToken, seed: Option<u64>) {
    let mut generator = SignalGenerator::new(seed);
    let mut detector = AnomalyDetector::new();
    let mut seq: u64 = 0;
    let mut degraded = false;
    let process_start = Instant::now();

    loop {
        let tick_start = Instant::now();

        let (anomaly_z, buffer_max) = {
            let cfg = shared.config.lock().expect("config mutex poisoned");
            (cfg.anomaly_z, cfg.buffer_max)
        };

        let (temp_c, hum_pct, vib_g) = generator.sample();
        let detection = detector.observe(temp_c, hum_pct, vib_g, anomaly_z);
        let diagnostics = generator.diagnostics();

        let mut metrics = BTreeMap::new();
        metrics.insert("temp_c".to_string(), round_to(temp_c, 3));
        metrics.insert("hum_pct".to_string(), round_to(hum_pct, 3));
        metrics.insert("vib_g".to_string(), round_to(vib_g, 4));

        let record = TelemetryRecord {
            node_id: shared.node_id.clone(),
            seq,
            ts_mono_ms: process_start.elapsed().as_millis() as u64,
            ts_wall_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            metrics,
            anomaly: detection.anomaly,
            diagnostics,
            degraded,
        };

        if let Err(e) = shared.wal.lock().await.append(&record).await {
            warn!("WAL append failed for seq {}: {e}", seq);
            // Drop this sample entirely: don't push it to the ring and
            // don't advance seq, so a retried sample at the next tick
            // gets a fresh, still-contiguous seq instead of colliding
            // with this one. Still falls through to the cadence sleep
            // below rather than spinning a hot loop on a stuck disk.
        } else {
            {
                let mut ring = shared.ring.lock().expect("ring mutex poisoned");
                ring.push(record);
            }

            seq += 1;

            let ring_len = shared.ring.lock().expect("ring mutex poisoned").len() as u64;
            let threshold = shared
                .config
                .lock()
                .expect("config mutex poisoned")
                .degraded_threshold();
            degraded = ring_len > threshold;
        }

        let elapsed = tick_start.elapsed();
        if elapsed < PERIOD {
            tokio::select! {
                _ = tokio::time::sleep(PERIOD - elapsed) => {}
                _ = shutdown.cancelled() => {
                    debug!("sample loop stopping after seq {}", seq);
                    return;
                }
            }
        } else {
            debug!("tick took {:?}, exceeding {:?}; not sleeping", elapsed, PERIOD);
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_matches_documented_precision() {
        assert_eq!(round_to(25.01234, 3), 25.012);
        assert_eq!(round_to(0.10345, 4), 0.1035);
    }

    #[test]
    fn signal_generator_is_deterministic_when_seeded() {
        let mut a = SignalGenerator::new(Some(7));
        let mut b = SignalGenerator::new(Some(7));
        for _ in 0..20 {
            assert_eq!(a.sample(), b.sample());
        }
    }

    #[test]
    fn signals_stay_near_their_documented_centers() {
        let mut gen = SignalGenerator::new(Some(1));
        for _ in 0..500 {
            let (temp, hum, vib) = gen.sample();
            assert!((temp - 25.0).abs() < 2.0);
            assert!((hum - 40.0).abs() < 2.0);
            assert!(vib >= 0.0 && vib < 1.0);
        }
    }
}
