//! HTTP Range header parsing
//!
//! Supports `bytes=start-end`, open-ended `bytes=start-` and suffix
//! `bytes=-length`. Multi-range headers are answered with their first range.

use thiserror::Error;

/// A satisfiable byte range, both ends inclusive, within `total_size`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl RangeRequest {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Never true: a parsed range always covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a 206 response
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("malformed Range header")]
    Malformed,
    #[error("range not satisfiable")]
    Unsatisfiable,
}

/// `Content-Range` value for a 416 response
pub fn unsatisfiable_content_range(total_size: u64) -> String {
    format!("bytes */{}", total_size)
}

/// Parse a Range header against an entity of `total_size` bytes.
///
/// An `end` beyond the entity is clamped to the last byte.
pub fn parse_range(header: &str, total_size: u64) -> Result<RangeRequest, RangeError> {
    let header = header.trim();
    let ranges = header
        .strip_prefix("bytes=")
        .ok_or(RangeError::Malformed)?;
    let first = ranges.split(',').next().unwrap_or_default().trim();
    let (start_str, end_str) = first.split_once('-').ok_or(RangeError::Malformed)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        // bytes=-N: the last N bytes
        let suffix: u64 = end_str.parse().map_err(|_| RangeError::Malformed)?;
        if suffix == 0 || total_size == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        return Ok(RangeRequest {
            start: total_size.saturating_sub(suffix),
            end: total_size - 1,
            total_size,
        });
    }

    let start: u64 = start_str.parse().map_err(|_| RangeError::Malformed)?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse::<u64>().map_err(|_| RangeError::Malformed)?)
    };

    if let Some(end) = end {
        if end < start {
            return Err(RangeError::Malformed);
        }
    }
    if start >= total_size {
        return Err(RangeError::Unsatisfiable);
    }

    let last = total_size - 1;
    let end = end.map_or(last, |end| end.min(last));
    Ok(RangeRequest {
        start,
        end,
        total_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("bytes=100-199", 1000, 100, 199)]
    #[case("bytes=0-0", 1000, 0, 0)]
    #[case("bytes=0-", 1000, 0, 999)]
    #[case("bytes=500-", 1000, 500, 999)]
    #[case("bytes=-100", 1000, 900, 999)]
    #[case("bytes=-5000", 1000, 0, 999)]
    #[case("bytes=900-5000", 1000, 900, 999)]
    #[case("bytes=0-999", 500000, 0, 999)]
    #[case("  bytes=10-19 ", 1000, 10, 19)]
    #[case("bytes=10-19, 50-59", 1000, 10, 19)]
    fn test_satisfiable_ranges(
        #[case] header: &str,
        #[case] total: u64,
        #[case] start: u64,
        #[case] end: u64,
    ) {
        let range = parse_range(header, total).unwrap();
        assert_eq!((range.start, range.end, range.total_size), (start, end, total));
    }

    #[rstest]
    #[case("bytes=2000-", 1000)]
    #[case("bytes=1000-1001", 1000)]
    #[case("bytes=-0", 1000)]
    #[case("bytes=0-", 0)]
    #[case("bytes=-10", 0)]
    fn test_unsatisfiable_ranges(#[case] header: &str, #[case] total: u64) {
        assert_eq!(parse_range(header, total), Err(RangeError::Unsatisfiable));
    }

    #[rstest]
    #[case("")]
    #[case("bytes=")]
    #[case("bytes=abc-def")]
    #[case("bytes=10")]
    #[case("items=0-10")]
    #[case("bytes=20-10")]
    #[case("bytes=-")]
    fn test_malformed_ranges(#[case] header: &str) {
        assert_eq!(parse_range(header, 1000), Err(RangeError::Malformed));
    }

    #[test]
    fn test_content_range_formatting() {
        let range = parse_range("bytes=100-199", 1000).unwrap();
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(), "bytes 100-199/1000");
        assert_eq!(unsatisfiable_content_range(1000), "bytes */1000");
    }
}
