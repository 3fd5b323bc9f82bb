use chrono::{DateTime, Utc};

use crate::TimestampError;

/// Parse the RFC3339 timestamp the runtime prefixes to a line
///
/// Format: `2024-01-15T10:30:00.123456789Z message...`
pub fn line_timestamp(line: &str) -> Result<DateTime<Utc>, TimestampError> {
    let token = line.trim_start().split(' ').next().unwrap_or_default();

    DateTime::parse_from_rfc3339(token)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| TimestampError::Invalid {
            line: line.chars().take(80).collect(),
            source,
        })
}

/// Timestamps of the first and last lines of a tailed chunk
///
/// The last line is the last non-blank one, so a chunk ending in a newline
/// (the usual case) and one cut mid-line both work.
pub fn chunk_bounds(chunk: &[u8]) -> Result<(DateTime<Utc>, DateTime<Utc>), TimestampError> {
    let text = String::from_utf8_lossy(chunk);
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let first = lines.next().ok_or(TimestampError::Empty)?;
    let last = lines.next_back().unwrap_or(first);

    Ok((line_timestamp(first)?, line_timestamp(last)?))
}

/// Removes the timestamp token from the start of every line
///
/// Keeps state between calls so a line split across chunks is handled.
#[derive(Debug)]
pub struct TimestampStripper {
    at_line_start: bool,
    skipping: bool,
}

impl Default for TimestampStripper {
    fn default() -> Self {
        Self {
            at_line_start: true,
            skipping: false,
        }
    }
}

impl TimestampStripper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strip(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len());

        for &b in chunk {
            if self.at_line_start {
                self.at_line_start = false;
                self.skipping = true;
            }

            if self.skipping {
                match b {
                    b' ' => self.skipping = false,
                    b'\n' => {
                        self.skipping = false;
                        self.at_line_start = true;
                        out.push(b);
                    }
                    _ => {}
                }
                continue;
            }

            out.push(b);
            if b == b'\n' {
                self.at_line_start = true;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_timestamp() {
        let ts = line_timestamp("2024-01-15T10:30:00.123456789Z some log message").unwrap();
        assert_eq!(ts.timestamp(), Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap().timestamp());
        assert_eq!(ts.timestamp_subsec_nanos(), 123_456_789);

        assert!(matches!(
            line_timestamp("no timestamp here"),
            Err(TimestampError::Invalid { .. })
        ));
    }

    #[test]
    fn test_chunk_bounds_with_trailing_newline() {
        let chunk = b"2024-01-15T10:00:00Z first\n2024-01-15T11:00:00Z middle\n2024-01-15T12:00:00Z last\n";
        let (first, last) = chunk_bounds(chunk).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        assert_eq!(last, Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_chunk_bounds_single_line_without_newline() {
        let (first, last) = chunk_bounds(b"2024-01-15T10:00:00Z only").unwrap();
        assert_eq!(first, last);
    }

    #[test]
    fn test_chunk_bounds_errors() {
        assert!(matches!(chunk_bounds(b"\n\n"), Err(TimestampError::Empty)));
        assert!(matches!(
            chunk_bounds(b"2024-01-15T10:00:00Z ok\ngarbage\n"),
            Err(TimestampError::Invalid { .. })
        ));
    }

    #[test]
    fn test_stripper_across_chunks() {
        let mut stripper = TimestampStripper::new();
        let mut out = stripper.strip(b"2024-01-15T10:00:00Z hel");
        out.extend(stripper.strip(b"lo\n2024-01-15T10:00:"));
        out.extend(stripper.strip(b"01Z world\n"));
        assert_eq!(out, b"hello\nworld\n");
    }

    #[test]
    fn test_stripper_keeps_blank_lines() {
        let mut stripper = TimestampStripper::new();
        assert_eq!(stripper.strip(b"2024-01-15T10:00:00Z\n2024-01-15T10:00:01Z x\n"), b"\nx\n");
    }
}
