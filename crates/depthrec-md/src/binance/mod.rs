//! Binance USDⓈ-M futures diff-depth capture.
//!
//! Produces one [`StreamDef`] per configured symbol, reading
//! `<symbol>@depth@<interval>ms` from `fstream.binance.com`.

pub mod config;
pub mod json_parser;

use anyhow::Result;
use depthrec_core::config::StreamConfig;
use depthrec_core::ws::WsConnConfig;

use self::config::BinanceConfig;
use crate::consumer::ConsumerConfig;
use crate::feed::WsConnector;
use crate::pipeline::StreamDef;

/// Build the Binance stream definition from the stream config.
pub fn build(stream: &StreamConfig) -> Result<StreamDef> {
    let cfg = BinanceConfig::from_stream(stream)?;
    let label = stream.label();

    let ws = WsConnConfig {
        url: cfg.ws_url,
        extra_headers: cfg.extra_headers,
        ping_interval: Some(stream.effective_ping_interval()),
        idle_timeout: stream.effective_idle_timeout(),
    };

    Ok(StreamDef {
        label: label.clone(),
        connector: Box::new(WsConnector::new(ws)?),
        parser: Box::new(json_parser::parse_depth_update),
        consumer: ConsumerConfig {
            label,
            exchange: "binance".into(),
            symbol: cfg.symbol,
            rotate_granularity_sec: stream.effective_rotate_granularity_sec(),
            backoff: stream.backoff_config(),
            invalid_message_policy: stream.effective_invalid_message_policy(),
            lag_report_every: stream.effective_lag_report_every(),
        },
        writer: stream.writer_config(),
        queue_capacity: stream.effective_queue_capacity(),
    })
}
