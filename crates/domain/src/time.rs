//! Time and timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// UTC timestamp used for run bookkeeping, schedule slots and event times.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Fixed-width RFC 3339 rendering (microseconds, `Z` suffix).
///
/// Values rendered this way sort lexicographically in time order, which
/// storage adapters rely on for `ORDER BY`.
#[must_use]
pub fn to_sortable(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
