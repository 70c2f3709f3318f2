//! # Column Codecs
//!
//! SQLite has no decimal type, and REAL would reintroduce binary floating
//! point. Every amount, rate and rule value is stored as canonical decimal
//! TEXT and parsed back on read.
//!
//! ```text
//!   Decimal 20000000.00 ──encode──► "20000000" ──decode──► Decimal 20000000
//!   "abc"               ──decode──► DbError::CorruptValue { column, value }
//! ```

use agritax_core::{Money, Period};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{DbError, DbResult};

/// Canonical TEXT form: no trailing zeros, no exponent.
pub(crate) fn encode_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn encode_money(value: Money) -> String {
    encode_decimal(value.amount())
}

pub(crate) fn encode_opt_decimal(value: Option<Decimal>) -> Option<String> {
    value.map(encode_decimal)
}

pub(crate) fn encode_opt_money(value: Option<Money>) -> Option<String> {
    value.map(encode_money)
}

pub(crate) fn decode_decimal(column: &str, text: &str) -> DbResult<Decimal> {
    Decimal::from_str(text.trim()).map_err(|_| DbError::corrupt(column, text))
}

pub(crate) fn decode_opt_decimal(column: &str, text: Option<&str>) -> DbResult<Option<Decimal>> {
    text.map(|t| decode_decimal(column, t)).transpose()
}

pub(crate) fn decode_money(column: &str, text: &str) -> DbResult<Money> {
    decode_decimal(column, text).map(Money::new)
}

pub(crate) fn decode_opt_money(column: &str, text: Option<&str>) -> DbResult<Option<Money>> {
    text.map(|t| decode_money(column, t)).transpose()
}

pub(crate) fn decode_period(column: &str, text: &str) -> DbResult<Period> {
    text.parse().map_err(|_| DbError::corrupt(column, text))
}

pub(crate) fn decode_count(column: &str, value: i64) -> DbResult<u32> {
    u32::try_from(value).map_err(|_| DbError::corrupt(column, value.to_string()))
}

/// Parses a JSON result payload.
pub(crate) fn decode_payload<T: serde::de::DeserializeOwned>(column: &str, text: &str) -> DbResult<T> {
    serde_json::from_str(text).map_err(|e| DbError::corrupt(column, e.to_string()))
}

pub(crate) fn encode_payload<T: serde::Serialize>(value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::Internal(format!("payload encoding failed: {e}")))
}
