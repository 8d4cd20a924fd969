//! Newline-delimited JSON framing between host and worker.

use crate::config::types::{GreenboxError, Result};
use crate::core::types::{ExecutionRequest, WorkerMessage};
use serde::Serialize;
use std::io::Write;

fn to_protocol_error(prefix: &str, err: impl std::fmt::Display) -> GreenboxError {
    GreenboxError::Protocol(format!("{prefix}: {err}"))
}

/// Write `value` as one JSON line and flush.
pub fn write_json_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let mut payload =
        serde_json::to_vec(value).map_err(|e| to_protocol_error("failed to encode json", e))?;
    payload.push(b'\n');
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

pub fn encode_request<W: Write>(writer: &mut W, req: &ExecutionRequest) -> Result<()> {
    write_json_line(writer, req)
}

/// Decode one worker line (without its trailing newline).
pub fn decode_worker_message(line: &[u8]) -> Result<WorkerMessage> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    serde_json::from_slice(line).map_err(|e| {
        let preview: String = String::from_utf8_lossy(line).chars().take(120).collect();
        to_protocol_error(&format!("undecodable worker line {preview:?}"), e)
    })
}
