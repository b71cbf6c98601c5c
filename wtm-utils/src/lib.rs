//! Shared utility functions for water tank monitor crates.

/// Timestamp utility functions
pub mod dates {
    use chrono::{Local, NaiveDateTime, Timelike};

    /// Timestamp format used in the persisted document and the data feed.
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    /// Older documents were written without seconds.
    const TIMESTAMP_FORMAT_MINUTES: &str = "%Y-%m-%d %H:%M";

    /// Format a NaiveDateTime as "YYYY-MM-DD HH:MM:SS"
    pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
        timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Parse a timestamp in "YYYY-MM-DD HH:MM:SS" format.
    ///
    /// Also accepts the ISO `T` separator and timestamps without seconds.
    pub fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
        let s = s.trim();
        let normalized = s.replacen('T', " ", 1);
        if let Ok(ts) = NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT) {
            return Ok(ts);
        }
        match NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT_MINUTES) {
            Ok(ts) => Ok(ts),
            Err(_) => Err(crate::error::DateError(format!("unrecognised timestamp '{}'", s)).into()),
        }
    }

    /// Drop sub-second precision.
    pub fn truncate_to_seconds(timestamp: NaiveDateTime) -> NaiveDateTime {
        timestamp.with_nanosecond(0).unwrap_or(timestamp)
    }

    /// Local wall-clock time with second precision.
    pub fn now_seconds() -> NaiveDateTime {
        truncate_to_seconds(Local::now().naive_local())
    }

    /// Serde adapter for `Option<NaiveDateTime>` fields stored as
    /// "YYYY-MM-DD HH:MM:SS" strings (or null).
    pub mod optional_timestamp {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(ts) => serializer.serialize_str(&super::format_timestamp(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(s) if s.trim().is_empty() || s == "null" => Ok(None),
                Some(s) => super::parse_timestamp(&s)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
            }
        }
    }

}

/// Error types
pub mod error {
    use std::fmt;

    #[derive(Debug)]
    pub struct DateError(pub String);

    impl fmt::Display for DateError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Date error: {}", self.0)
        }
    }

    impl std::error::Error for DateError {}
}
