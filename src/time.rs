use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserializer, Serializer, Deserialize};

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses a UTC timestamp given as unix seconds, RFC 3339, `TIMESTAMP_FORMAT` or a
/// plain date.
pub(crate) fn parse_date_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse::<i64>().ok()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
            .map(|t| t.naive_utc());
    }

    DateTime::parse_from_rfc3339(raw).map(|t| t.naive_utc()).ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
}

// deserialize function for reading NaiveDateTime
pub(crate) fn deserialize_date_time<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<NaiveDateTime, D::Error> {
    let raw: &str = Deserialize::deserialize(d)?;
    parse_date_time(raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

pub(crate) fn serialize_date_time<S: Serializer>(date: &NaiveDateTime, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&date.format(TIMESTAMP_FORMAT).to_string())
}
