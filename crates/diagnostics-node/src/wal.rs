// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write-ahead log.
//!
//! One append-only newline-JSON file per node at
//! `<workdir>/<node_id>.wal`. `append` reopens the file in append mode
//! each call; `read_all`/`compact_up_to` reopen it in read mode.
//! Compaction is crash-safe: the new file is written to a sibling temp
//! path and renamed over the original, so a crash mid-compaction leaves
//! either the pre- or post-compaction file intact, never a
//! half-written one.

use diagnostics_proto::TelemetryRecord;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub struct Wal {
    path: PathBuf,
}

impl Wal {
    /// Opens (creating if absent) the WAL file for `node_id` under `workdir`.
    pub async fn open(workdir: &Path, node_id: &str) -> io::Result<Self> {
        fs::create_dir_all(workdir).await?;
        let path = workdir.join(format!("{node_id}.wal"));
        // touch so read_all on a brand-new node never hits NotFound.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record. Visible to a subsequent `read_all` within
    /// this process once this returns; not fsynced per-append, trading
    /// durability across a crash for not stalling the sample cadence.
    pub async fn append(&self, record: &TelemetryRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record).expect("TelemetryRecord serializes");
        line.push(b'\n');

        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(&line).await?;
        file.flush().await
    }

    /// Reads every well-formed record currently in the WAL, in file
    /// order. Lines that fail to parse (e.g. a torn write after a crash)
    /// are skipped rather than failing the whole read.
    pub async fn read_all(&self) -> io::Result<Vec<TelemetryRecord>> {
        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<TelemetryRecord>(&line) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Rewrites the WAL keeping only records with `seq > ack_seq`,
    /// atomically via write-new-then-rename.
    pub async fn compact_up_to(&self, ack_seq: u64) -> io::Result<()> {
        let kept: Vec<TelemetryRecord> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.seq > ack_seq)
            .collect();

        let tmp_path = self.path.with_extension("wal.compact.tmp");
        {
            let mut tmp = File::create(&tmp_path).await?;
            for record in &kept {
                let mut line = serde_json::to_vec(record).expect("TelemetryRecord serializes");
                line.push(b'\n');
                tmp.write_all(&line).await?;
            }
            tmp.flush().await?;
            tmp.sync_all().await?;
        }
        fs::rename(&tmp_path, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagnostics_proto::Diagnostics;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(seq: u64) -> TelemetryRecord {
        TelemetryRecord {
            node_id: "n1".into(),
            seq,
            ts_mono_ms: seq,
            ts_wall_ms: seq,
            metrics: BTreeMap::new(),
            anomaly: false,
            diagnostics: Diagnostics {
                diag_ok: true,
                diag_reason: String::new(),
            },
            degraded: false,
        }
    }

    #[tokio::test]
    async fn append_then_read_all_preserves_order() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), "n1").await.unwrap();
        for seq in 0..5 {
            wal.append(&record(seq)).await.unwrap();
        }
        let all = wal.read_all().await.unwrap();
        assert_eq!(all.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn compact_up_to_keeps_only_newer_records() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), "n1").await.unwrap();
        for seq in 0..10 {
            wal.append(&record(seq)).await.unwrap();
        }
        wal.compact_up_to(5).await.unwrap();
        let remaining = wal.read_all().await.unwrap();
        assert_eq!(
            remaining.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![6, 7, 8, 9]
        );
    }

    #[tokio::test]
    async fn compact_on_empty_wal_is_a_noop() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), "n1").await.unwrap();
        wal.compact_up_to(100).await.unwrap();
        assert!(wal.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_trailing_line_is_skipped() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), "n1").await.unwrap();
        wal.append(&record(0)).await.unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(wal.path())
                .await
                .unwrap();
            file.write_all(b"{not valid json\n").await.unwrap();
        }
        let all = wal.read_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn reopening_an_existing_node_wal_preserves_contents() {
        let dir = tempdir().unwrap();
        {
            let wal = Wal::open(dir.path(), "n1").await.unwrap();
            wal.append(&record(0)).await.unwrap();
        }
        let wal = Wal::open(dir.path(), "n1").await.unwrap();
        assert_eq!(wal.read_all().await.unwrap().len(), 1);
    }
}
