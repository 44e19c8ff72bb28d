//! `Range: bytes=...` parsing for a single range.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("malformed range header")]
    Malformed,
    #[error("range not satisfiable")]
    Unsatisfiable,
}

/// Parse a range header against a resource of `size` bytes.
///
/// Accepts `start-end`, `start-` and `-suffix`. Syntax problems are
/// [`RangeError::Malformed`]; well-formed ranges outside the resource are
/// [`RangeError::Unsatisfiable`].
pub fn parse_range_header(header: &str, size: u64) -> Result<ByteRange, RangeError> {
    let ranges = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Malformed)?;

    let parts: Vec<&str> = ranges.split('-').collect();
    if parts.len() != 2 {
        return Err(RangeError::Malformed);
    }
    let first = parse_bound(parts[0])?;
    let second = parse_bound(parts[1])?;

    let (start, end) = match (first, second) {
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => (start, size.saturating_sub(1)),
        (None, Some(suffix)) => {
            if suffix == 0 {
                return Err(RangeError::Unsatisfiable);
            }
            (size.saturating_sub(suffix), size.saturating_sub(1))
        }
        (None, None) => return Err(RangeError::Malformed),
    };

    if size == 0 || start >= size || end >= size || start > end {
        return Err(RangeError::Unsatisfiable);
    }

    Ok(ByteRange { start, end })
}

fn parse_bound(raw: &str) -> Result<Option<u64>, RangeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed);
    }
    raw.parse().map(Some).map_err(|_| RangeError::Malformed)
}
