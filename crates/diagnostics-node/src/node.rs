// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node orchestration: shared state and task lifecycle.

use crate::config::NodeConfig;
use crate::wal::Wal;
use diagnostics_proto::TelemetryRecord;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::ring::RingBuffer;

/// State shared between the sample task and the tx/rx task.
///
/// The ring and config use a plain `std::sync::Mutex` since their
/// critical sections never hold across an `.await`; the WAL uses a
/// `tokio::sync::Mutex` because both tasks touch it across awaited
/// file I/O.
pub struct NodeShared {
    pub node_id: String,
    pub ring: StdMutex<RingBuffer<TelemetryRecord>>,
    pub wal: AsyncMutex<Wal>,
    pub config: StdMutex<NodeConfig>,
}

impl NodeShared {
    pub fn new(node_id: String, wal: Wal, config: NodeConfig) -> Self {
        let ring = RingBuffer::new(config.buffer_max.max(1) as usize);
        Self {
            node_id,
            ring: StdMutex::new(ring),
            wal: AsyncMutex::new(wal),
            config: StdMutex::new(config),
        }
    }
}
