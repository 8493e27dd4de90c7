use time::macros::format_description;
use time::{Date, Duration};

use crate::ValidationError;

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<Date, ValidationError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        ValidationError::InvalidDate {
            value: value.to_string(),
        }
    })
}

/// Renders a date the way the store keys it.
pub fn format_date(date: Date) -> String {
    // Formatting into a String only fails on io errors; Display renders the same layout.
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// `date` minus `days` calendar days, saturating at the earliest representable date.
pub fn days_before(date: Date, days: i64) -> Date {
    date.checked_sub(Duration::days(days)).unwrap_or(Date::MIN)
}

/// Serde adapter keeping dates as `YYYY-MM-DD` strings in JSON.
pub mod iso_date {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(de::Error::custom)
    }
}
