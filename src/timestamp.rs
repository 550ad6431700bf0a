//! Serde helpers for the naive local timestamps stored in book and chapter documents.
//!
//! Documents are written as `YYYY-MM-DDTHH:MM:SS.ffffff`. Reading accepts that form with or
//! without fractional seconds, and RFC 3339 values carrying an offset.

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Deserializer, Serializer};

const WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const READ_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// The current local wall-clock time, at the microsecond precision documents store.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

pub fn format(ts: &NaiveDateTime) -> String {
    ts.format(WRITE_FORMAT).to_string()
}

pub fn parse(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, READ_FORMAT)
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
}

pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}
