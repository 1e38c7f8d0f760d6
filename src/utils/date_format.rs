use time::{Date, OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339, macros::format_description};

/// Extracts the millisecond timestamp from Xero's .NET JSON format (`/Date(1562284800000+0000)/`).
fn dotnet_timestamp_millis(value: &str) -> Option<i64> {
    let inner = value.strip_prefix("/Date(")?.strip_suffix(")/")?;
    // The offset suffix (`+0000`) never changes the instant.
    let millis = inner
        .split_once(['+', '-'])
        .filter(|(millis, _)| !millis.is_empty())
        .map_or(inner, |(millis, _)| millis);
    millis.parse().ok()
}

/// Parses a Xero date, accepting the .NET JSON format, a `DateString` such as
/// `2019-07-05T00:00:00`, or a plain ISO date.
pub fn parse_dotnet_date(date_str: &str) -> Result<Date, String> {
    if let Some(millis) = dotnet_timestamp_millis(date_str) {
        return OffsetDateTime::from_unix_timestamp(millis.div_euclid(1000))
            .map(OffsetDateTime::date)
            .map_err(|e| format!("Invalid timestamp: {e}"));
    }

    let date_part = date_str.split('T').next().unwrap_or(date_str);
    Date::parse(date_part, &format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("Failed to parse date '{date_str}': {e}"))
}

/// Parses a Xero timestamp. Values without an offset are taken as UTC.
pub fn parse_dotnet_datetime(datetime_str: &str) -> Result<OffsetDateTime, String> {
    if let Some(millis) = dotnet_timestamp_millis(datetime_str) {
        return OffsetDateTime::from_unix_timestamp(millis.div_euclid(1000))
            .map_err(|e| format!("Invalid timestamp: {e}"));
    }

    if let Ok(dt) = OffsetDateTime::parse(datetime_str, &Rfc3339) {
        return Ok(dt);
    }

    // e.g. "2025-03-03T06:17:25.8448470"
    let with_subseconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let without_subseconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(datetime_str, &with_subseconds)
        .or_else(|_| PrimitiveDateTime::parse(datetime_str, &without_subseconds))
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| format!("Failed to parse datetime '{datetime_str}': no matching format"))
}

/// Formats a date as `YYYY-MM-DD`.
#[must_use]
pub fn format_iso_date(date: Date) -> String {
    date.format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

// Lenient optional date: unparsable or empty values become `None`.
pub mod xero_date_format_option {
    use serde::{Deserialize, Deserializer};
    use time::Date;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        Ok(opt
            .filter(|s| !s.is_empty())
            .and_then(|s| super::parse_dotnet_date(&s).ok()))
    }
}

pub mod xero_datetime_format_option {
    use serde::{Deserialize, Deserializer};
    use time::OffsetDateTime;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        Ok(opt
            .filter(|s| !s.is_empty())
            .and_then(|s| super::parse_dotnet_datetime(&s).ok()))
    }
}
