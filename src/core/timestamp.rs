// Companion - core/timestamp.rs
//
// Resolves the raw timestamp text delivered by a node into a UTC instant.
// Nodes are not consistent: some send RFC 3339, some a naive local-free
// ISO string, some epoch milliseconds. Anything unrecognised resolves to
// `None`; resolution never panics.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Naive formats tried after RFC 3339, most specific first.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Epoch-millisecond values outside this window are treated as garbage rather
/// than instants (roughly 2001-09-09 to 2286-11-20).
const EPOCH_MS_MIN: i64 = 1_000_000_000_000;
const EPOCH_MS_MAX: i64 = 9_999_999_999_999;

/// Resolve `raw` to a UTC instant.
///
/// Strategy:
///   1. RFC 3339 / ISO 8601 with timezone (`2024-01-15T14:30:22.5+05:30`, `...Z`).
///   2. Naive ISO forms treated as UTC, after normalising `T` and `/` separators
///      (`2024-01-15T14:30:22`, `2024/01/15 14:30:22`).
///   3. Integer Unix epoch milliseconds.
pub fn resolve(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let normalised = trimmed.replace('/', "-").replacen('T', " ", 1);
    for format in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&normalised, format) {
            return Some(ndt.and_utc());
        }
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(ms) = trimmed.parse::<i64>() {
            if (EPOCH_MS_MIN..=EPOCH_MS_MAX).contains(&ms) {
                return DateTime::from_timestamp_millis(ms);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(raw: &str) -> String {
        resolve(raw)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| "<none>".to_string())
    }

    #[test]
    fn test_rfc3339_zulu() {
        assert_eq!(fmt("2024-01-15T14:30:22Z"), "2024-01-15 14:30:22.000");
    }

    #[test]
    fn test_rfc3339_offset_converted_to_utc() {
        assert_eq!(fmt("2024-01-15T14:30:22.250+05:30"), "2024-01-15 09:00:22.250");
    }

    #[test]
    fn test_naive_t_separator() {
        assert_eq!(fmt("2024-01-15T14:30:22"), "2024-01-15 14:30:22.000");
    }

    #[test]
    fn test_naive_space_with_fraction() {
        assert_eq!(fmt("2024-01-15 14:30:22.125"), "2024-01-15 14:30:22.125");
    }

    #[test]
    fn test_slash_separated_date() {
        assert_eq!(fmt("2024/01/15 14:30:22"), "2024-01-15 14:30:22.000");
    }

    #[test]
    fn test_epoch_millis() {
        assert_eq!(fmt("1705329022000"), "2024-01-15 14:30:22.000");
    }

    #[test]
    fn test_small_integers_are_not_epochs() {
        assert!(resolve("42").is_none());
    }

    #[test]
    fn test_garbage_and_empty_resolve_to_none() {
        assert!(resolve("").is_none());
        assert!(resolve("   ").is_none());
        assert!(resolve("yesterday-ish").is_none());
        assert!(resolve("2024-13-45T99:99:99Z").is_none());
    }
}
