/// Output boundaries
/// Character caps for captured script output and byte caps for protocol lines
/// read back from the worker.
use crate::config::types::OutputIntegrity;
use std::io::{BufRead, ErrorKind};

/// Output limits configuration
#[derive(Debug, Clone)]
pub struct OutputLimits {
    /// Captured stdout cap (characters)
    pub max_output_chars: usize,
    /// Single protocol line cap (bytes)
    pub max_line_bytes: usize,
}

impl OutputLimits {
    /// Limits for a given character cap. A result line holds the JSON
    /// encoding of the captured output and of the error text, both capped at
    /// `max_output_chars`. JSON escapes a character to at most 12 bytes (a
    /// surrogate pair), and the envelope gets a fixed allowance.
    pub fn for_output_chars(max_output_chars: usize) -> Self {
        OutputLimits {
            max_output_chars,
            max_line_bytes: max_output_chars
                .saturating_mul(2 * 12)
                .saturating_add(64 * 1024),
        }
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self::for_output_chars(50_000)
    }
}

/// Keep at most `max_chars` characters of `text`.
pub fn bound_output(mut text: String, max_chars: usize) -> (String, OutputIntegrity) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            text.truncate(cut);
            (text, OutputIntegrity::TruncatedByLimit)
        }
        None => (text, OutputIntegrity::Complete),
    }
}

/// Read one `\n`-terminated line, keeping at most `limit` bytes of it.
///
/// The remainder of an over-long line is consumed and dropped so the next
/// call starts on a line boundary. Returns `Ok(None)` at end of stream.
pub fn read_line_bounded<R: BufRead>(
    reader: &mut R,
    limit: usize,
) -> std::io::Result<Option<(Vec<u8>, OutputIntegrity)>> {
    let mut line = Vec::new();
    let mut integrity = OutputIntegrity::Complete;
    let mut saw_bytes = false;

    loop {
        let available = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if available.is_empty() {
            return Ok(saw_bytes.then_some((line, integrity)));
        }
        saw_bytes = true;

        let newline = available.iter().position(|&b| b == b'\n');
        let chunk = match newline {
            Some(pos) => &available[..pos],
            None => available,
        };

        let room = limit.saturating_sub(line.len());
        if chunk.len() > room {
            line.extend_from_slice(&chunk[..room]);
            integrity = OutputIntegrity::TruncatedByLimit;
        } else {
            line.extend_from_slice(chunk);
        }

        let consumed = newline.map_or(available.len(), |pos| pos + 1);
        reader.consume(consumed);

        if newline.is_some() {
            return Ok(Some((line, integrity)));
        }
    }
}
