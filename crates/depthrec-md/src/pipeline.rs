//! Generic capture pipeline engine.
//!
//! Provides [`CaptureStream`], a data-driven implementation of
//! [`CaptureModule`]. Each exchange only needs to provide a
//! `build(config) -> StreamDef` function describing its stream; the engine
//! wires the write queue, the writer thread and the consumer task.
//!
//! # Architecture
//!
//! ```text
//! StreamDef ──► CaptureStream.start() ──► write queue
//!                                     ──► spawn_blocking(run_writer_loop)
//!                                     ──► spawn(StreamConsumer::run)
//!           ──► CaptureStream.stop()  ──► shutdown signal, await consumer, await writer
//! ```

use std::io;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use depthrec_core::queue::write_queue;
use depthrec_core::writer::{WriterConfig, WriterStats, run_writer_loop};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::CaptureModule;
use crate::consumer::{ConsumerConfig, ConsumerStats, DepthParser, StreamConsumer};
use crate::feed::FeedConnector;

/// Everything needed to set up one feed-to-disk pipeline.
pub struct StreamDef {
    /// Human-readable label (e.g. `"binance_btcusdt"`).
    pub label: String,
    pub connector: Box<dyn FeedConnector>,
    pub parser: DepthParser,
    pub consumer: ConsumerConfig,
    pub writer: WriterConfig,
    pub queue_capacity: usize,
}

/// One recorded stream: a consumer task feeding a writer thread.
pub struct CaptureStream {
    name: String,
    def: Option<StreamDef>,
    shutdown: Option<watch::Sender<bool>>,
    consumer: Option<JoinHandle<depthrec_core::error::Result<ConsumerStats>>>,
    writer: Option<JoinHandle<io::Result<WriterStats>>>,
}

impl CaptureStream {
    pub fn new(def: StreamDef) -> Self {
        Self { name: def.label.clone(), def: Some(def), shutdown: None, consumer: None, writer: None }
    }
}

#[async_trait]
impl CaptureModule for CaptureStream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<()> {
        let def = self.def.take().ok_or_else(|| anyhow!("[{}] already started", self.name))?;
        let StreamDef { label, connector, parser, consumer, writer, queue_capacity } = def;

        let (queue, rx) = write_queue(queue_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);

        let writer_label = label.clone();
        self.writer = Some(tokio::task::spawn_blocking(move || run_writer_loop(&writer_label, rx, writer)));

        let consumer = StreamConsumer::new(consumer, connector, parser, queue, stop_rx);
        self.consumer = Some(tokio::spawn(consumer.run()));
        self.shutdown = Some(stop_tx);

        info!("[{label}] started (queue capacity {queue_capacity})");
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.consumer.as_ref().is_some_and(JoinHandle::is_finished)
            || self.writer.as_ref().is_some_and(JoinHandle::is_finished)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }

        let mut failure = None;

        if let Some(handle) = self.consumer.take() {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!("[{}] consumer failed: {e}", self.name);
                    failure.get_or_insert_with(|| anyhow!("[{}] consumer failed: {e}", self.name));
                }
                Err(e) => {
                    error!("[{}] consumer task panicked: {e}", self.name);
                    failure.get_or_insert_with(|| anyhow!("[{}] consumer task panicked: {e}", self.name));
                }
            }
        }

        // The queue is closed once the consumer is gone, so the writer drains and exits.
        if let Some(handle) = self.writer.take() {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    failure.get_or_insert_with(|| anyhow!("[{}] writer failed: {e}", self.name));
                }
                Err(e) => {
                    error!("[{}] writer thread panicked: {e}", self.name);
                    failure.get_or_insert_with(|| anyhow!("[{}] writer thread panicked: {e}", self.name));
                }
            }
        }

        info!("[{}] stopped", self.name);
        failure.map_or(Ok(()), Err)
    }
}
