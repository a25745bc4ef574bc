// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

//! Claim timestamp freshness validation.

use chrono::{DateTime, Utc};

/// Check that an ISO-8601 timestamp lies within `window_minutes` of now,
/// in either direction. Fails closed on any parse error.
///
/// A trailing `Z` and explicit UTC offsets are both accepted.
pub fn verify_timestamp(timestamp: &str, window_minutes: i64) -> bool {
    let parsed = match DateTime::parse_from_rfc3339(timestamp) {
        Ok(t) => t.with_timezone(&Utc),
        Err(err) => {
            tracing::warn!(timestamp, %err, "invalid claim timestamp format");
            return false;
        }
    };

    let skew_seconds = (Utc::now() - parsed).num_seconds().abs();
    if skew_seconds > window_minutes * 60 {
        tracing::warn!(
            timestamp,
            skew_seconds,
            window_minutes,
            "claim timestamp outside freshness window"
        );
        return false;
    }

    true
}

/// Current time formatted the way claims carry it (`...Z` suffix, seconds
/// precision).
pub fn claim_timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn current_timestamp_is_valid() {
        assert!(verify_timestamp(&claim_timestamp_now(), 5));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let stale = (Utc::now() - Duration::minutes(120))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        assert!(!verify_timestamp(&stale, 5));
    }

    #[test]
    fn future_timestamp_beyond_window_is_rejected() {
        let ahead = (Utc::now() + Duration::minutes(30))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        assert!(!verify_timestamp(&ahead, 5));
    }

    #[test]
    fn timestamp_just_inside_window_passes() {
        let recent = (Utc::now() - Duration::minutes(4))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        assert!(verify_timestamp(&recent, 5));
    }

    #[test]
    fn offset_suffix_is_accepted() {
        let with_offset = (Utc::now() - Duration::minutes(1))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
        assert!(with_offset.ends_with("+00:00"));
        assert!(verify_timestamp(&with_offset, 5));
    }

    #[test]
    fn garbage_fails_closed() {
        assert!(!verify_timestamp("not-a-timestamp", 5));
        assert!(!verify_timestamp("", 5));
    }
}
