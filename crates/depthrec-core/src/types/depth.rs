//! Order-book depth delta as captured from the exchange.
//!
//! # Wire format
//!
//! Serialized one JSON object per line with the keys
//! `exchange, symbol, conn_id, recv_ts_ns, event_ts_ms, U, u, b, a`. The
//! bid/ask levels are kept exactly as the exchange reported them (usually
//! `["price", "qty"]` string pairs); interpreting them is the normalizer's job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single depth delta covering exchange updates `U..=u`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthDelta {
    pub exchange: String,
    pub symbol: String,
    /// Physical connection that produced this record. Update-id continuity
    /// is only meaningful between records sharing a `conn_id`.
    #[serde(rename = "conn_id")]
    pub connection_id: u64,
    /// Local receipt time, nanoseconds since epoch.
    #[serde(rename = "recv_ts_ns")]
    pub received_at_ns: u64,
    /// Exchange event time, milliseconds since epoch.
    #[serde(rename = "event_ts_ms")]
    pub event_time_ms: u64,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub last_update_id: u64,
    #[serde(rename = "b")]
    pub bid_levels: Vec<Value>,
    #[serde(rename = "a")]
    pub ask_levels: Vec<Value>,
}

impl DepthDelta {
    /// Serialize as one newline-terminated log line.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Receipt-to-event lag in microseconds, saturating at zero when the
    /// local clock is behind the exchange.
    pub fn feed_lag_us(&self) -> u64 {
        (self.received_at_ns / 1_000).saturating_sub(self.event_time_ms.saturating_mul(1_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DepthDelta {
        DepthDelta {
            exchange: "binance".into(),
            symbol: "BTCUSDT".into(),
            connection_id: 3,
            received_at_ns: 1_700_000_000_123_000_000,
            event_time_ms: 1_700_000_000_100,
            first_update_id: 10,
            last_update_id: 12,
            bid_levels: vec![json!(["100.5", "1.25"])],
            ask_levels: vec![],
        }
    }

    #[test]
    fn line_uses_raw_record_keys() {
        let line = sample().to_line().unwrap();
        assert_eq!(*line.last().unwrap(), b'\n');
        let v: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(v["conn_id"], 3);
        assert_eq!(v["recv_ts_ns"], 1_700_000_000_123_000_000u64);
        assert_eq!(v["event_ts_ms"], 1_700_000_000_100u64);
        assert_eq!(v["U"], 10);
        assert_eq!(v["u"], 12);
        assert_eq!(v["b"], json!([["100.5", "1.25"]]));
        assert_eq!(v["a"], json!([]));
    }

    #[test]
    fn feed_lag() {
        assert_eq!(sample().feed_lag_us(), 23_000);
        let mut early = sample();
        early.received_at_ns = 0;
        assert_eq!(early.feed_lag_us(), 0);
    }

    #[test]
    fn feed_lag_saturates_on_far_future_event_time() {
        let mut future = sample();
        future.event_time_ms = u64::MAX / 1_000 + 1;
        assert_eq!(future.feed_lag_us(), 0);
        future.event_time_ms = u64::MAX;
        assert_eq!(future.feed_lag_us(), 0);
    }
}
