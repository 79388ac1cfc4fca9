// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Newline-delimited JSON framing.
//!
//! Every frame is one complete JSON object followed by `\n`. There is no
//! length prefix; the newline is the sole delimiter, and JSON's own
//! escaping keeps literal `\n` out of field values. A line longer than
//! [`MAX_LINE_BYTES`] is dropped without ever being handed to
//! `serde_json`, the connection stays open either way.

use crate::frame::Frame;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Safety limit on a single frame line.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Outcome of reading one line of the wire protocol.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A frame parsed successfully.
    Frame(Frame),
    /// The line was well-formed but not a frame this version understands,
    /// or failed to parse as JSON at all. The connection stays open.
    Dropped,
    /// The peer closed the connection cleanly (no more data).
    Closed,
}

/// Reads one newline-delimited frame from a buffered async reader.
///
/// Returns `Ok(ReadOutcome::Closed)` on a graceful EOF with no partial
/// data pending. I/O errors propagate; parse errors and oversize lines
/// are reported as `Dropped`, never as `Err`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<ReadOutcome>
where
    R: AsyncBufRead + Unpin,
{
    match read_capped_line(reader, MAX_LINE_BYTES).await? {
        None => Ok(ReadOutcome::Closed),
        Some(CappedLine::Oversize) => Ok(ReadOutcome::Dropped),
        Some(CappedLine::Bytes(bytes)) => match serde_json::from_slice::<Frame>(&bytes) {
            Ok(frame) => Ok(ReadOutcome::Frame(frame)),
            Err(_) => Ok(ReadOutcome::Dropped),
        },
    }
}

/// Serializes `frame` as compact JSON and writes it followed by `\n`.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_vec(frame).expect("Frame serialization is infallible");
    json.push(b'\n');
    writer.write_all(&json).await?;
    writer.flush().await
}

enum CappedLine {
    Bytes(Vec<u8>),
    Oversize,
}

/// Reads up to the next `\n`, bounding memory growth at `max` bytes even
/// when the line is far longer (or never terminates before EOF).
async fn read_capped_line<R>(reader: &mut R, max: usize) -> io::Result<Option<CappedLine>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut oversize = false;
    let mut saw_any_byte = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return if saw_any_byte {
                Ok(Some(if oversize {
                    CappedLine::Oversize
                } else {
                    CappedLine::Bytes(buf)
                }))
            } else {
                Ok(None)
            };
        }

        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            saw_any_byte = true;
            if !oversize {
                if buf.len() + pos > max {
                    oversize = true;
                } else {
                    buf.extend_from_slice(&available[..pos]);
                }
            }
            reader.consume(pos + 1);
            return Ok(Some(if oversize {
                CappedLine::Oversize
            } else {
                CappedLine::Bytes(buf)
            }));
        }

        saw_any_byte = true;
        if !oversize {
            if buf.len() + available.len() > max {
                oversize = true;
            } else {
                buf.extend_from_slice(available);
            }
        }
        let n = available.len();
        reader.consume(n);
    }
}
