//! Binance-specific configuration extraction.

use std::collections::HashMap;

use anyhow::{Result, bail};
use depthrec_core::config::StreamConfig;

/// USDⓈ-M futures market streams.
pub const FUTURES_WS_BASE: &str = "wss://fstream.binance.com/ws";

/// Push intervals Binance offers for diff-depth streams.
pub const SUPPORTED_DEPTH_INTERVALS_MS: [u64; 3] = [100, 250, 500];

/// Parsed Binance stream configuration.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub symbol: String,
    pub ws_url: String,
    pub depth_interval_ms: u64,
    pub extra_headers: HashMap<String, String>,
}

impl BinanceConfig {
    pub fn from_stream(stream: &StreamConfig) -> Result<Self> {
        let depth_interval_ms = stream.effective_depth_interval_ms();
        if !SUPPORTED_DEPTH_INTERVALS_MS.contains(&depth_interval_ms) {
            bail!(
                "binance depth_interval_ms must be one of {:?}, got {depth_interval_ms}",
                SUPPORTED_DEPTH_INTERVALS_MS
            );
        }

        let ws_url = match &stream.ws_url {
            Some(url) => url.clone(),
            None => depth_stream_url(&stream.symbol, depth_interval_ms),
        };

        Ok(Self {
            symbol: stream.symbol.clone(),
            ws_url,
            depth_interval_ms,
            extra_headers: stream.extra_headers(),
        })
    }
}

/// Raw-stream URL for the diff-depth channel of one symbol.
///
/// 250ms is the exchange default and has no suffix.
pub fn depth_stream_url(symbol: &str, interval_ms: u64) -> String {
    let sym = symbol.to_lowercase();
    if interval_ms == 250 {
        format!("{FUTURES_WS_BASE}/{sym}@depth")
    } else {
        format!("{FUTURES_WS_BASE}/{sym}@depth@{interval_ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url() {
        let cfg = BinanceConfig::from_stream(&StreamConfig::new("binance", "BTCUSDT")).unwrap();
        assert_eq!(cfg.ws_url, "wss://fstream.binance.com/ws/btcusdt@depth@100ms");
        assert_eq!(cfg.depth_interval_ms, 100);
    }

    #[test]
    fn interval_variants() {
        assert_eq!(depth_stream_url("ETHUSDT", 500), "wss://fstream.binance.com/ws/ethusdt@depth@500ms");
        assert_eq!(depth_stream_url("ETHUSDT", 250), "wss://fstream.binance.com/ws/ethusdt@depth");
    }

    #[test]
    fn url_override_and_bad_interval() {
        let mut s = StreamConfig::new("binance", "BTCUSDT");
        s.ws_url = Some("ws://127.0.0.1:9000/feed".into());
        assert_eq!(BinanceConfig::from_stream(&s).unwrap().ws_url, "ws://127.0.0.1:9000/feed");

        s.depth_interval_ms = Some(1000);
        let err = BinanceConfig::from_stream(&s).unwrap_err().to_string();
        assert!(err.contains("depth_interval_ms"), "{err}");
    }
}
