//! Timestamp encoding for the database.
//!
//! Timestamps are stored as ISO-8601 UTC strings with millisecond
//! precision. The text form sorts lexicographically in timestamp order
//! and sidesteps per-dialect differences in sub-second handling.

use chrono::{DateTime, SecondsFormat, Utc};

/// Encodes a timestamp into its stored text form.
pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decodes a stored timestamp.
pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_round_trip_keeps_millisecond_precision() {
        let original = Utc.with_ymd_and_hms(2026, 3, 4, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(987);
        let text = format_timestamp(original);
        assert_eq!(text, "2026-03-04T12:30:45.987Z");
        assert_eq!(parse_timestamp(&text).unwrap(), original);
    }

    #[test]
    fn test_text_ordering_matches_timestamp_ordering() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 4, 12, 30, 45).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("not-a-timestamp").is_err());
    }
}
