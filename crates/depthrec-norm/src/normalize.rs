//! Raw record → normalized delta.
//!
//! Price levels arrive as `["price", "qty"]` pairs, strings or numbers
//! depending on the exchange. Normalization turns them into `f64` pairs and
//! rejects anything that cannot be a real book level.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// `[price, quantity]`.
pub type Level = [f64; 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("update range inverted: U={first} > u={last}")]
    InvertedRange { first: u64, last: u64 },

    #[error("{side} level {index} is not a [price, qty] pair")]
    MalformedLevel { side: Side, index: usize },

    #[error("{side} level {index}: {value} is not a number")]
    NotANumber { side: Side, index: usize, value: String },

    #[error("{side} level {index}: {value} is negative or not finite")]
    OutOfRange { side: Side, index: usize, value: f64 },
}

/// Normalized output record, one per kept raw line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDelta {
    pub exchange: String,
    pub symbol: String,
    #[serde(rename = "conn_id")]
    pub connection_id: u64,
    #[serde(rename = "recv_ts_ns")]
    pub received_at_ns: u64,
    #[serde(rename = "event_ts_ms")]
    pub event_time_ms: u64,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub last_update_id: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Normalize a record that already passed
/// [`validate_raw_record`](depthrec_core::validate::validate_raw_record).
pub fn normalize_record(raw: &Value) -> Result<NormalizedDelta, NormalizeError> {
    let first = raw["U"].as_u64().unwrap_or_default();
    let last = raw["u"].as_u64().unwrap_or_default();
    if first > last {
        return Err(NormalizeError::InvertedRange { first, last });
    }

    Ok(NormalizedDelta {
        exchange: raw["exchange"].as_str().unwrap_or_default().to_string(),
        symbol: raw["symbol"].as_str().unwrap_or_default().to_string(),
        connection_id: raw["conn_id"].as_u64().unwrap_or_default(),
        received_at_ns: raw["recv_ts_ns"].as_u64().unwrap_or_default(),
        event_time_ms: raw["event_ts_ms"].as_u64().unwrap_or_default(),
        first_update_id: first,
        last_update_id: last,
        bids: parse_levels(&raw["b"], Side::Bid)?,
        asks: parse_levels(&raw["a"], Side::Ask)?,
    })
}

fn parse_levels(levels: &Value, side: Side) -> Result<Vec<Level>, NormalizeError> {
    let Some(levels) = levels.as_array() else {
        return Ok(Vec::new());
    };
    levels
        .iter()
        .enumerate()
        .map(|(index, level)| match level.as_array().map(Vec::as_slice) {
            Some([price, qty]) => Ok([parse_number(price, side, index)?, parse_number(qty, side, index)?]),
            _ => Err(NormalizeError::MalformedLevel { side, index }),
        })
        .collect()
}

/// String or number → finite, non-negative `f64`.
#[inline]
fn parse_number(v: &Value, side: Side, index: usize) -> Result<f64, NormalizeError> {
    let parsed = match v {
        Value::String(s) => fast_float2::parse::<f64, _>(s.trim()).ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    let value = parsed.ok_or_else(|| NormalizeError::NotANumber { side, index, value: v.to_string() })?;
    if !value.is_finite() || value < 0.0 {
        return Err(NormalizeError::OutOfRange { side, index, value });
    }
    Ok(value)
}
