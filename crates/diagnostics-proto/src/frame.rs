// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire frames exchanged between a diagnostics node and the host.
//!
//! One frame is one JSON object on one line (see [`crate::codec`]). The
//! `type` field dispatches parsing; an implementation MUST ignore frames
//! whose `type` it doesn't recognize, so [`Frame`] does not carry a
//! catch-all variant, so `serde_json::from_str` failing with an unknown
//! tag is treated the same as any other parse error by the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recognized telemetry metric names.
pub const METRIC_TEMP_C: &str = "temp_c";
pub const METRIC_HUM_PCT: &str = "hum_pct";
pub const METRIC_VIB_G: &str = "vib_g";

/// Diagnostic sub-object carried on every telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub diag_ok: bool,
    pub diag_reason: String,
}

/// One sample emitted by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub node_id: String,
    pub seq: u64,
    pub ts_mono_ms: u64,
    pub ts_wall_ms: u64,
    pub metrics: BTreeMap<String, f64>,
    pub anomaly: bool,
    pub diagnostics: Diagnostics,
    pub degraded: bool,
}

/// Host's high-watermark acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AckFrame {
    pub ack_seq: i64,
}

/// Optional runtime config fields a host may push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_max: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdateFrame {
    pub cfg_version: i64,
    pub config: ConfigPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigAppliedFrame {
    pub node_id: String,
    pub cfg_version_applied: i64,
    pub ts_wall_ms: u64,
}

/// Tagged union of every frame kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "telemetry")]
    Telemetry(TelemetryRecord),
    #[serde(rename = "ack")]
    Ack(AckFrame),
    #[serde(rename = "config_update")]
    ConfigUpdate(ConfigUpdateFrame),
    #[serde(rename = "config_applied")]
    ConfigApplied(ConfigAppliedFrame),
}

impl Frame {
    /// The `seq` carried by this frame, if it is a telemetry frame.
    pub fn telemetry_seq(&self) -> Option<u64> {
        match self {
            Frame::Telemetry(r) => Some(r.seq),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TelemetryRecord {
        let mut metrics = BTreeMap::new();
        metrics.insert(METRIC_TEMP_C.to_string(), 25.012);
        metrics.insert(METRIC_HUM_PCT.to_string(), 40.2);
        metrics.insert(METRIC_VIB_G.to_string(), 0.1034);
        TelemetryRecord {
            node_id: "node-a".into(),
            seq: 7,
            ts_mono_ms: 123,
            ts_wall_ms: 456,
            metrics,
            anomaly: false,
            diagnostics: Diagnostics {
                diag_ok: true,
                diag_reason: String::new(),
            },
            degraded: false,
        }
    }

    #[test]
    fn telemetry_roundtrips_through_json() {
        let frame = Frame::Telemetry(sample_record());
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"telemetry\""));
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn ack_roundtrips_and_never_needs_node_id() {
        let frame = Frame::Ack(AckFrame { ack_seq: 41 });
        let json = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
        assert!(!json.contains("node_id"));
    }

    #[test]
    fn config_update_allows_any_subset_of_fields() {
        let frame = Frame::ConfigUpdate(ConfigUpdateFrame {
            cfg_version: 17,
            config: ConfigPatch {
                anomaly_z: Some(2.5),
                window: None,
                buffer_max: None,
            },
        });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("window"));
        assert!(!json.contains("buffer_max"));
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn unknown_type_tag_fails_to_parse() {
        let json = r#"{"type":"bogus","x":1}"#;
        let result: Result<Frame, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn telemetry_seq_extracts_only_from_telemetry_frames() {
        let t = Frame::Telemetry(sample_record());
        assert_eq!(t.telemetry_seq(), Some(7));
        let a = Frame::Ack(AckFrame { ack_seq: 1 });
        assert_eq!(a.telemetry_seq(), None);
    }
}
