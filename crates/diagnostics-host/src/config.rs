// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Diagnostics Host configuration.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

/// Diagnostics Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 9000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory received telemetry is appended to, one `<node_id>.jsonl` per node
    #[serde(default = "default_logdir")]
    pub logdir: String,

    /// Master switch for the fault-injection knobs below
    #[serde(default)]
    pub faults_enabled: bool,

    /// Per-frame probability of closing the connection immediately
    #[serde(default)]
    pub drop_prob: f64,

    /// Fixed per-frame ingress delay before acking
    #[serde(default)]
    pub ack_delay_ms: u64,

    /// Seconds between unsolicited `config_update` pushes; 0 disables
    #[serde(default)]
    pub push_config_every_s: f64,
}

fn default_bind_address() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    9000
}

fn default_logdir() -> String {
    "./host_data".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            logdir: default_logdir(),
            faults_enabled: false,
            drop_prob: 0.0,
            ack_delay_ms: 0,
            push_config_every_s: 0.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if !(0.0..=1.0).contains(&self.drop_prob) {
            return Err(ConfigError::InvalidValue(
                "drop_prob must be within [0.0, 1.0]".into(),
            ));
        }
        if self.push_config_every_s < 0.0 {
            return Err(ConfigError::InvalidValue(
                "push_config_every_s cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9000);
        assert!(!config.faults_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.port, parsed.port);
    }

    #[test]
    fn test_validation_port_zero() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_drop_prob_out_of_range() {
        let config = ServerConfig {
            drop_prob: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn push_config_every_s_zero_is_valid_and_means_disabled() {
        let config = ServerConfig::default();
        assert_eq!(config.push_config_every_s, 0.0);
        assert!(config.validate().is_ok());
    }
}
