use std::str::FromStr;

use anyhow::Result;

use super::types::{ChunkRef, SessionEvent};
use crate::error::ChunkRefError;

impl FromStr for ChunkRef {
    type Err = ChunkRefError;

    /// Split `{prefix}@{offset}`. Anything after a second `@` is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, rest) = s
            .split_once('@')
            .ok_or_else(|| ChunkRefError::MissingSeparator(s.to_string()))?;
        let raw_offset = rest.split('@').next().unwrap_or(rest);
        let offset = raw_offset
            .parse::<u32>()
            .map_err(|_| ChunkRefError::InvalidOffset {
                reference: s.to_string(),
                offset: raw_offset.to_string(),
            })?;
        Ok(ChunkRef::new(prefix, offset))
    }
}

/// Parse a single NDJSON line into a `SessionEvent`.
///
/// Returns `Ok(None)` for empty lines.
/// Returns `Err` for malformed JSON (caller should warn, not crash).
pub fn parse_line(line: &str) -> Result<Option<SessionEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event: SessionEvent = serde_json::from_str(line)?;
    Ok(Some(event))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ref_basic() {
        let r: ChunkRef = "2024-01-01T10:00@12".parse().unwrap();
        assert_eq!(r.prefix(), "2024-01-01T10:00");
        assert_eq!(r.offset(), 12);
    }

    #[test]
    fn chunk_ref_missing_separator() {
        assert_eq!(
            "abc".parse::<ChunkRef>(),
            Err(ChunkRefError::MissingSeparator("abc".to_string()))
        );
    }

    #[test]
    fn chunk_ref_bad_offset() {
        let err = "abc@x1".parse::<ChunkRef>().unwrap_err();
        assert!(matches!(err, ChunkRefError::InvalidOffset { ref offset, .. } if offset == "x1"));
    }

    #[test]
    fn chunk_ref_ignores_trailing_segments() {
        let r: ChunkRef = "p@2@extra".parse().unwrap();
        assert_eq!(r, ChunkRef::new("p", 2));
    }

    #[test]
    fn parse_empty_line() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("  \n").unwrap().is_none());
    }

    #[test]
    fn unknown_fields_dont_crash() {
        let line = r#"{"id":1,"timestamp":2,"chunk_id":"a@0","type":"stop_listening","unknown_field":"value","another":123}"#;
        assert!(parse_line(line).unwrap().is_some());
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(parse_line("{not json").is_err());
    }
}
