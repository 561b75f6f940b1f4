use std::fmt;

use tracing::trace;

use crate::RangeError;

const BYTES_UNIT: &str = "bytes=";

/// A single byte range, inclusive on both ends and 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a new byte range covering `start..=end`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "byte range {start}-{end} is inverted");
        ByteRange { start, end }
    }

    /// The range covering a whole resource of `size` bytes. `size` must be non-zero.
    pub fn full(size: u64) -> Self {
        ByteRange::new(0, size - 1)
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_full(&self, size: u64) -> bool {
        self.start == 0 && self.end + 1 == size
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Ranges sorted by `start`, pairwise disjoint and never adjacent.
///
/// Only [`merge_ranges`] constructs one, so the ordering invariant always holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RangeSet(Vec<ByteRange>);

impl RangeSet {
    pub fn as_slice(&self) -> &[ByteRange] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ByteRange> {
        self.0.iter()
    }

    /// Returns the only range in the set, if there is exactly one.
    pub fn single(&self) -> Option<ByteRange> {
        match self.0.as_slice() {
            [range] => Some(*range),
            _ => None,
        }
    }

    /// True when the set is exactly one range spanning the whole resource.
    pub fn is_full(&self, size: u64) -> bool {
        self.single().is_some_and(|range| range.is_full(size))
    }

    pub fn into_vec(self) -> Vec<ByteRange> {
        self.0
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a ByteRange;
    type IntoIter = std::slice::Iter<'a, ByteRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parses a `Range` header against a resource of `target_size` bytes.
///
/// A missing header means the whole resource. Otherwise the header must use the
/// `bytes` unit and hold a comma separated list of `N`, `N-`, `-N` or `N-M`
/// specs. Open ends and suffixes are resolved and `M` is clamped to the last
/// byte. The result is in header order, neither sorted nor merged.
pub fn parse_range_header(range_header: Option<&str>, target_size: u64) -> Result<Vec<ByteRange>, RangeError> {
    let Some(end_index) = target_size.checked_sub(1) else {
        return Err(RangeError::EmptyResource);
    };

    let Some(range_header) = range_header else {
        return Ok(vec![ByteRange::new(0, end_index)]);
    };

    let Some(specs) = range_header.strip_prefix(BYTES_UNIT) else {
        return Err(RangeError::MalformedRangeHeader(range_header.to_string()));
    };

    specs
        .split(',')
        .map(|spec| parse_range_spec(spec.trim(), end_index))
        .collect()
}

fn parse_range_spec(spec: &str, end_index: u64) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::MalformedRangeHeader(spec.to_string());

    let (start, end) = match spec.split_once('-') {
        // "N", not in the RFC but sent by some clients
        None => (parse_position(spec).ok_or_else(malformed)?, end_index),
        Some((first, last)) => {
            let (first, last) = (first.trim(), last.trim());
            match (first.is_empty(), last.is_empty()) {
                (true, true) => return Err(malformed()),
                // "-N", the last N bytes
                (true, false) => {
                    let suffix = parse_position(last).ok_or_else(malformed)?;
                    if suffix == 0 {
                        return Err(malformed());
                    }
                    ((end_index + 1).saturating_sub(suffix), end_index)
                }
                // "N-"
                (false, true) => (parse_position(first).ok_or_else(malformed)?, end_index),
                // "N-M"
                (false, false) => {
                    let start = parse_position(first).ok_or_else(malformed)?;
                    let end = parse_position(last).ok_or_else(malformed)?;
                    if end < start {
                        return Err(malformed());
                    }
                    (start, end.min(end_index))
                }
            }
        }
    };

    if start > end_index {
        return Err(malformed());
    }

    trace!(spec, start, end, "parsed range spec");
    Ok(ByteRange::new(start, end))
}

/// Parses `1*DIGIT`.
fn parse_position(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Sorts ranges by start and coalesces overlapping or adjacent ones.
pub fn merge_ranges(mut ranges: Vec<ByteRange>) -> RangeSet {
    // stable, so equal starts keep header order
    ranges.sort_by_key(|range| range.start);

    let mut merged: Vec<ByteRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end.saturating_add(1) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }

    RangeSet(merged)
}
