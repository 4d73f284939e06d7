//! Column encoding helpers shared by the repositories.

use std::str::FromStr;

use autoflow_domain::time::{Timestamp, to_sortable};

pub(crate) fn decode_err(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

/// Timestamps are stored fixed-width so that text order is time order.
pub(crate) fn encode_ts(ts: Timestamp) -> String {
    to_sortable(ts)
}

pub(crate) fn decode_ts(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.to_utc())
        .map_err(decode_err)
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(value).map_err(decode_err)
}

pub(crate) fn decode_parsed<T>(value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value).map_err(decode_err)
}
