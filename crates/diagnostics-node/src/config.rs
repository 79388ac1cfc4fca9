// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node runtime configuration.

use diagnostics_proto::ConfigPatch;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mutable-at-runtime node configuration.
///
/// `window` is accepted from a `config_update` frame but has no effect
/// on the current (unbounded-window) anomaly detector. `buffer_max`
/// changing does not resize the ring in place; it only moves the
/// degraded threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_anomaly_z")]
    pub anomaly_z: f64,
    #[serde(default = "default_window")]
    pub window: u64,
    #[serde(default = "default_buffer_max")]
    pub buffer_max: u64,
}

fn default_anomaly_z() -> f64 {
    3.0
}

fn default_window() -> u64 {
    120
}

fn default_buffer_max() -> u64 {
    5000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            anomaly_z: default_anomaly_z(),
            window: default_window(),
            buffer_max: default_buffer_max(),
        }
    }
}

impl NodeConfig {
    /// Applies any subset of fields present in a `config_update` patch.
    /// Unknown fields were already dropped during deserialization of
    /// [`ConfigPatch`]; this never rejects a well-formed patch, it simply
    /// discards out-of-range values rather than erroring.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) {
        if let Some(z) = patch.anomaly_z {
            if z.is_finite() && z > 0.0 {
                self.anomaly_z = z;
            }
        }
        if let Some(window) = patch.window {
            self.window = window;
        }
        if let Some(buffer_max) = patch.buffer_max {
            if buffer_max > 0 {
                self.buffer_max = buffer_max;
            }
        }
    }

    /// The degraded threshold: `floor(0.8 * buffer_max)`.
    pub fn degraded_threshold(&self) -> u64 {
        (0.8 * self.buffer_max as f64).floor() as u64
    }

    /// Loads config from a JSON file, an alternate source for the same
    /// fields the CLI flags set.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.anomaly_z.is_finite() || self.anomaly_z <= 0.0 {
            return Err(ConfigError::InvalidValue("anomaly_z must be > 0".into()));
        }
        if self.buffer_max == 0 {
            return Err(ConfigError::InvalidValue("buffer_max must be > 0".into()));
        }
        Ok(())
    }
}

/// Config loading/validation error.
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "I/O error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.anomaly_z, 3.0);
        assert_eq!(cfg.window, 120);
        assert_eq!(cfg.buffer_max, 5000);
    }

    #[test]
    fn apply_patch_updates_only_present_fields() {
        let mut cfg = NodeConfig::default();
        cfg.apply_patch(&ConfigPatch {
            anomaly_z: Some(2.5),
            window: None,
            buffer_max: None,
        });
        assert_eq!(cfg.anomaly_z, 2.5);
        assert_eq!(cfg.window, 120);
        assert_eq!(cfg.buffer_max, 5000);
    }

    #[test]
    fn apply_patch_rejects_non_positive_anomaly_z() {
        let mut cfg = NodeConfig::default();
        cfg.apply_patch(&ConfigPatch {
            anomaly_z: Some(-1.0),
            window: None,
            buffer_max: None,
        });
        assert_eq!(cfg.anomaly_z, 3.0);
    }

    #[test]
    fn degraded_threshold_floors() {
        let cfg = NodeConfig {
            anomaly_z: 3.0,
            window: 120,
            buffer_max: 5000,
        };
        assert_eq!(cfg.degraded_threshold(), 4000);

        let cfg_odd = NodeConfig {
            buffer_max: 11,
            ..cfg
        };
        assert_eq!(cfg_odd.degraded_threshold(), 8);
    }

    #[test]
    fn validate_rejects_zero_buffer_max() {
        let cfg = NodeConfig {
            buffer_max: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_file_roundtrips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, r#"{"anomaly_z":2.5,"window":60,"buffer_max":1000}"#).unwrap();
        let cfg = NodeConfig::from_file(&path).unwrap();
        assert_eq!(cfg.anomaly_z, 2.5);
        assert_eq!(cfg.buffer_max, 1000);
    }
}
