use serde_json::{Map, Value};

/// Separator between records on the wire.
pub const RECORD_SEPARATOR: &[u8] = b"\n\n";

/// Largest partial record held while waiting for its separator.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Reassembles `\n\n`-separated records from arbitrary chunk boundaries.
///
/// Splitting happens on raw bytes so a multi-byte UTF-8 character cut in
/// half by the transport is only decoded once both halves have arrived.
///
/// A partial record that outgrows the cap is discarded; whatever follows it
/// up to the next separator then fails to parse and is dropped as well.
#[derive(Debug)]
pub struct RecordSplitter {
    buffer: Vec<u8>,
    max_record_bytes: usize,
}

impl Default for RecordSplitter {
    fn default() -> Self {
        Self::with_max_record_bytes(MAX_RECORD_BYTES)
    }
}

impl RecordSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_record_bytes(max_record_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_record_bytes,
        }
    }

    /// Append a chunk and return every record it completed, in order.
    ///
    /// The trailing fragment after the last separator stays buffered until a
    /// later chunk completes it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = find_separator(&self.buffer[start..]) {
            let end = start + offset;
            let fragment = String::from_utf8_lossy(&self.buffer[start..end]);
            if !fragment.trim().is_empty() {
                records.push(fragment.into_owned());
            }
            start = end + RECORD_SEPARATOR.len();
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_record_bytes {
            tracing::warn!(
                "Discarding partial stream record over {} bytes",
                self.max_record_bytes
            );
            self.buffer.clear();
        }
        records
    }

    /// Bytes held back waiting for a separator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn find_separator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(RECORD_SEPARATOR.len())
        .position(|window| window == RECORD_SEPARATOR)
}

/// Decode one record into a JSON object.
///
/// Records may be bare JSON or SSE-style `data:` lines; comment lines starting
/// with `:` are ignored. Anything that is not a JSON object yields `None`.
pub fn parse_record(fragment: &str) -> Option<Map<String, Value>> {
    let mut payload = String::new();
    for raw_line in fragment.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        let value = match line.strip_prefix("data:") {
            Some(stripped) => stripped.trim_start(),
            None => line,
        };
        if !payload.is_empty() {
            payload.push('\n');
        }
        payload.push_str(value);
    }

    match serde_json::from_str::<Value>(payload.trim()) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            tracing::trace!("Discarding non-object stream record: {}", other);
            None
        }
        Err(e) => {
            tracing::trace!("Discarding malformed stream record: {}", e);
            None
        }
    }
}
