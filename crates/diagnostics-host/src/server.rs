// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Diagnostics Host core implementation: accept loop and lifecycle.

use crate::config::ServerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod connection;

pub use connection::ConnectionError;

/// Diagnostics Host - accepts node connections, persists telemetry, acks.
#[derive(Clone)]
pub struct DiagnosticsHost {
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl DiagnosticsHost {
    /// Create a new host.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    /// Signal the accept loop and all connection handlers to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run the accept loop until shutdown, one spawned task per connection.
    pub async fn run(&self) -> Result<(), ServerError> {
        use std::sync::atomic::Ordering;
        use tokio::net::TcpListener;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        info!("diagnostics host listening on {}", addr);
        let logdir = PathBuf::from(&self.config.logdir);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            info!("new connection from {}", peer_addr);
                            let config = self.config.clone();
                            let logdir = logdir.clone();

                            tokio::spawn(async move {
                                if let Err(e) = connection::handle(stream, peer_addr, &config, &logdir).await {
                                    warn!("connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Bind(String),
    AlreadyRunning,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(s) => write!(f, "configuration error: {s}"),
            Self::Bind(s) => write!(f, "bind error: {s}"),
            Self::AlreadyRunning => write!(f, "server is already running"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Bind(e.to_string())
    }
}

impl From<connection::ConnectionError> for ServerError {
    fn from(e: connection::ConnectionError) -> Self {
        Self::Bind(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_config() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(DiagnosticsHost::new(config).is_err());
    }

    #[tokio::test]
    async fn run_twice_concurrently_is_rejected() {
        let config = ServerConfig {
            port: 0,
            bind_address: "127.0.0.1".parse().unwrap(),
            ..Default::default()
        };
        let host = DiagnosticsHost::new(config).unwrap();
        let host2 = host.clone();
        let h = tokio::spawn(async move { host2.run().await });
        tokio::task::yield_now().await;
        let second = host.run().await;
        assert!(matches!(second, Err(ServerError::AlreadyRunning)));
        host.shutdown();
        let _ = h.await;
    }
}
