//! Module registry: factory for creating capture modules from config.

use anyhow::{Result, anyhow};
use depthrec_core::config::StreamConfig;

use crate::{CaptureModule, pipeline::CaptureStream};

/// Create a `CaptureModule` based on the `exchange` field in the config.
pub fn create_capture_module(config: &StreamConfig) -> Result<Box<dyn CaptureModule>> {
    let def = match config.exchange.to_lowercase().as_str() {
        "binance" => crate::binance::build(config)?,
        other => return Err(anyhow!("Unknown exchange: {other}")),
    };
    Ok(Box::new(CaptureStream::new(def)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_binance() {
        let m = create_capture_module(&StreamConfig::new("Binance", "BTCUSDT")).unwrap();
        assert_eq!(m.name(), "binance_btcusdt");
    }

    #[test]
    fn unknown_exchange() {
        let err = create_capture_module(&StreamConfig::new("kraken", "XBTUSD")).err().unwrap();
        assert!(err.to_string().contains("kraken"));
    }
}
