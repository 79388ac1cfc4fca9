// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared wire types for the diagnostics node/host pipeline.
//!
//! This crate holds only what both peers must agree on: the frame enum
//! and the newline-JSON codec that reads/writes it. Node- and
//! host-specific behavior (the WAL, the ring buffer, the per-connection
//! state machines) lives in `diagnostics-node` and `diagnostics-host`.

pub mod codec;
pub mod frame;

pub use codec::{read_frame, write_frame, ReadOutcome, MAX_LINE_BYTES};
pub use frame::{
    AckFrame, ConfigAppliedFrame, ConfigPatch, ConfigUpdateFrame, Diagnostics, Frame,
    TelemetryRecord, METRIC_HUM_PCT, METRIC_TEMP_C, METRIC_VIB_G,
};
