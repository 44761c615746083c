//! Configuration parsing for the recorder.
//!
//! Everything is read from a single JSON file. The top level carries logging
//! metadata and a `streams` array; each entry describes one exchange/symbol
//! depth stream recorded into its own directory. Every tunable is optional
//! and has an `effective_*` accessor supplying the default.
//!
//! # Example config
//!
//! ```json
//! {
//!   "meta": { "module_name": "depthrec", "log_path": "/var/log/depthrec" },
//!   "streams": [{
//!     "exchange": "binance",
//!     "symbol": "BTCUSDT",
//!     "out_dir": "data/binance/BTCUSDT/raw",
//!     "depth_interval_ms": 100,
//!     "queue_capacity": 500000,
//!     "batch_size": 2000,
//!     "flush_interval_ms": 500
//!   }]
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::backoff::{BackoffConfig, DEFAULT_MAX_BACKOFF, DEFAULT_MIN_BACKOFF};
use crate::error::DepthRecError;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::writer::{DEFAULT_BATCH_SIZE, DEFAULT_FILE_PREFIX, DEFAULT_FLUSH_INTERVAL, WriterConfig};

/// Top-level application config.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub meta: Option<ModuleMeta>,
    pub streams: Vec<StreamConfig>,
}

impl AppConfig {
    pub fn module_name(&self) -> String {
        self.meta.as_ref().and_then(|m| m.module_name.clone()).unwrap_or_else(|| "depthrec".to_string())
    }

    pub fn log_path(&self) -> Option<String> {
        self.meta.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Reject configs that would fail only once streams are running.
    pub fn validate(&self) -> Result<(), DepthRecError> {
        if self.streams.is_empty() {
            return Err(DepthRecError::Config("no streams configured".into()));
        }
        for (idx, s) in self.streams.iter().enumerate() {
            s.validate().map_err(|e| DepthRecError::Config(format!("streams[{idx}]: {e}")))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// What the stream consumer does with a message that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidMessagePolicy {
    /// Count it, log it, keep the connection.
    #[default]
    Skip,
    /// Treat it as fatal to the connection and reconnect.
    Reconnect,
}

/// One recorded depth stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Exchange identifier, e.g. `"binance"`.
    pub exchange: String,

    /// Exchange symbol, e.g. `"BTCUSDT"`.
    pub symbol: String,

    /// Raw output directory (default: `data/<exchange>/<symbol>/raw`).
    pub out_dir: Option<String>,

    /// Endpoint override; the exchange adapter builds the URL when unset.
    pub ws_url: Option<String>,

    /// Extra HTTP headers for the WebSocket handshake.
    pub extra_headers: Option<HashMap<String, String>>,

    /// Exchange depth push interval (default: 100).
    pub depth_interval_ms: Option<u64>,

    /// Write queue capacity in items (default: 500 000).
    pub queue_capacity: Option<usize>,

    /// Width of one file bucket in seconds (default: 60).
    pub rotate_granularity_sec: Option<u64>,

    /// Writer flush threshold in lines (default: 2000).
    pub batch_size: Option<usize>,

    /// Writer flush threshold in milliseconds (default: 500).
    pub flush_interval_ms: Option<u64>,

    /// `fsync` every file before its final rename (default: false).
    pub fsync_on_finalize: Option<bool>,

    /// Reconnect backoff bounds (defaults: 250ms, 10s).
    pub backoff_min_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,

    /// Client ping interval in seconds (default: 15).
    pub ping_interval_sec: Option<u64>,

    /// Reconnect when nothing arrives for this long (default: 30).
    pub idle_timeout_sec: Option<u64>,

    /// Handling of messages that fail validation (default: `skip`).
    pub invalid_message_policy: Option<InvalidMessagePolicy>,

    /// Log feed-lag statistics every N messages (default: 100 000).
    pub lag_report_every: Option<u64>,

    /// CPU core for the writer thread.
    #[serde(alias = "cpu_affinity_writer")]
    pub writer_cpu_core: Option<i32>,
}

impl StreamConfig {
    /// Minimal config with every tunable at its default.
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            out_dir: None,
            ws_url: None,
            extra_headers: None,
            depth_interval_ms: None,
            queue_capacity: None,
            rotate_granularity_sec: None,
            batch_size: None,
            flush_interval_ms: None,
            fsync_on_finalize: None,
            backoff_min_ms: None,
            backoff_max_ms: None,
            ping_interval_sec: None,
            idle_timeout_sec: None,
            invalid_message_policy: None,
            lag_report_every: None,
            writer_cpu_core: None,
        }
    }

    /// Short label used in log lines, e.g. `binance_btcusdt`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.exchange.to_lowercase(), self.symbol.to_lowercase())
    }

    pub fn effective_out_dir(&self) -> PathBuf {
        match &self.out_dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new("data").join(self.exchange.to_lowercase()).join(&self.symbol).join("raw"),
        }
    }

    pub fn effective_depth_interval_ms(&self) -> u64 {
        self.depth_interval_ms.unwrap_or(100)
    }

    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn effective_rotate_granularity_sec(&self) -> u64 {
        self.rotate_granularity_sec.unwrap_or(60)
    }

    pub fn effective_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_sec.unwrap_or(15))
    }

    pub fn effective_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_sec.unwrap_or(30))
    }

    pub fn effective_invalid_message_policy(&self) -> InvalidMessagePolicy {
        self.invalid_message_policy.unwrap_or_default()
    }

    pub fn effective_lag_report_every(&self) -> u64 {
        self.lag_report_every.unwrap_or(100_000)
    }

    pub fn extra_headers(&self) -> HashMap<String, String> {
        self.extra_headers.clone().unwrap_or_default()
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            out_dir: self.effective_out_dir(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
            flush_interval: self.flush_interval_ms.map(Duration::from_millis).unwrap_or(DEFAULT_FLUSH_INTERVAL),
            fsync_on_finalize: self.fsync_on_finalize.unwrap_or(false),
            cpu_core: self.writer_cpu_core,
        }
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            min: self.backoff_min_ms.map(Duration::from_millis).unwrap_or(DEFAULT_MIN_BACKOFF),
            max: self.backoff_max_ms.map(Duration::from_millis).unwrap_or(DEFAULT_MAX_BACKOFF),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.exchange.trim().is_empty() {
            return Err("exchange is empty".into());
        }
        if self.symbol.trim().is_empty() {
            return Err("symbol is empty".into());
        }
        if self.queue_capacity == Some(0) {
            return Err("queue_capacity must be > 0".into());
        }
        if self.rotate_granularity_sec == Some(0) {
            return Err("rotate_granularity_sec must be > 0".into());
        }
        if self.idle_timeout_sec == Some(0) {
            return Err("idle_timeout_sec must be > 0".into());
        }
        if self.backoff_min_ms == Some(0) {
            return Err("backoff_min_ms must be > 0".into());
        }
        Ok(())
    }
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
