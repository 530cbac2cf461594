//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, Utc};
use rusqlite::Error as SqlError;

/// Parse a DateTime from microseconds since the Unix epoch
pub fn parse_micros(column: usize, micros: i64) -> Result<DateTime<Utc>, SqlError> {
    DateTime::from_timestamp_micros(micros).ok_or(SqlError::IntegralValueOutOfRange(column, micros))
}
