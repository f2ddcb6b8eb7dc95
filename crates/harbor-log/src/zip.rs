//! Payload compression.
//!
//! Large record payloads are stored compressed with a PackBits run-length
//! scheme: a control byte `c` is either `0..=127` (copy the next `c + 1`
//! bytes literally) or `129..=255` (repeat the next byte `257 - c` times);
//! `128` is a no-op. A stored compressed payload is the raw length as a
//! little-endian `u32` followed by the PackBits stream.

use crate::error::{LogError, LogResult};

/// Compresses `raw` into a PackBits stream.
#[must_use]
pub fn compress(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() / 2 + 8);
    let mut i = 0;

    while i < raw.len() {
        let byte = raw[i];
        let mut run = 1;
        while i + run < raw.len() && raw[i + run] == byte && run < 128 {
            run += 1;
        }

        if run >= 3 {
            out.push((257 - run) as u8);
            out.push(byte);
            i += run;
            continue;
        }

        // Literal stretch: up to 128 bytes, stopping where a run starts.
        let start = i;
        let mut literal = 0;
        while i < raw.len() && literal < 128 {
            if i + 2 < raw.len() && raw[i] == raw[i + 1] && raw[i] == raw[i + 2] {
                break;
            }
            i += 1;
            literal += 1;
        }
        out.push((literal - 1) as u8);
        out.extend_from_slice(&raw[start..start + literal]);
    }

    out
}

/// Decompresses a PackBits stream, appending to `out`.
pub fn decompress_into(stored: &[u8], out: &mut Vec<u8>) -> LogResult<()> {
    let mut i = 0;

    while i < stored.len() {
        let control = stored[i];
        i += 1;

        if control == 128 {
            continue;
        }

        if control < 128 {
            let count = control as usize + 1;
            if i + count > stored.len() {
                return Err(LogError::corrupted_payload(format!(
                    "literal stretch of {} bytes exceeds stream",
                    count
                )));
            }
            out.extend_from_slice(&stored[i..i + count]);
            i += count;
        } else {
            let count = 257 - control as usize;
            let Some(&byte) = stored.get(i) else {
                return Err(LogError::corrupted_payload("run without a repeat byte"));
            };
            out.extend(std::iter::repeat(byte).take(count));
            i += 1;
        }
    }

    Ok(())
}

/// Encodes a payload for compressed storage: `[u32 raw_len][packbits]`.
#[must_use]
pub fn compress_payload(raw: &[u8]) -> Vec<u8> {
    let stream = compress(raw);
    let mut out = Vec::with_capacity(4 + stream.len());
    out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    out.extend_from_slice(&stream);
    out
}

/// Reusable decompression scratch, sized once to the maximum payload.
#[derive(Debug, Default)]
pub struct LogZip {
    buf: Vec<u8>,
}

impl LogZip {
    /// Creates an empty scratch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows the scratch to hold at least `capacity` bytes.
    pub fn realloc_if_needed(&mut self, capacity: usize) {
        if self.buf.capacity() < capacity {
            self.buf.reserve(capacity.saturating_sub(self.buf.len()));
        }
    }

    /// Inflates a stored compressed payload into the scratch and returns
    /// the raw bytes.
    pub fn decompress(&mut self, stored: &[u8]) -> LogResult<&[u8]> {
        if stored.len() < 4 {
            return Err(LogError::corrupted_payload(
                "compressed payload shorter than its length prefix",
            ));
        }

        let raw_len = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]) as usize;
        self.buf.clear();
        decompress_into(&stored[4..], &mut self.buf)?;

        if self.buf.len() != raw_len {
            return Err(LogError::corrupted_payload(format!(
                "decompressed to {} bytes, expected {}",
                self.buf.len(),
                raw_len
            )));
        }

        Ok(&self.buf)
    }
}
