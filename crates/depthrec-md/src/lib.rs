//! # depthrec-md
//!
//! Exchange adapters and the capture pipeline that records them.
//!
//! ## Architecture
//!
//! Each exchange provides a `build(config) -> StreamDef` function that
//! describes its feed (endpoint, parser). The generic
//! [`pipeline::CaptureStream`] engine handles queue creation, the writer
//! thread and the consumer task automatically.
//!
//! ## Shared infrastructure
//!
//! - [`pipeline`]: `StreamDef` + `CaptureStream` data-driven engine
//! - [`consumer`]: connection state machine and per-message handling
//! - [`feed`]: connection seam (`FeedConnector` / `Feed`)

pub mod binance;
pub mod consumer;
pub mod feed;
pub mod pipeline;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;

/// Trait implemented by all capture modules.
///
/// Only `Send` is required (not `Sync`) because modules are accessed
/// sequentially by the runner, never concurrently.
#[async_trait]
pub trait CaptureModule: Send {
    /// Human-readable module name.
    fn name(&self) -> &str;
    /// Spawn the writer and connect.
    async fn start(&mut self) -> Result<()>;
    /// True once a started module has stopped on its own (writer or
    /// consumer failure).
    fn is_finished(&self) -> bool;
    /// Signal shutdown, let the writer drain and finalize, and report any
    /// failure seen along the way.
    async fn stop(&mut self) -> Result<()>;
}
