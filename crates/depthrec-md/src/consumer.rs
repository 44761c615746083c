//! Stream consumer: one long-lived task per recorded stream.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──ok──► Connected ──error/close──► Disconnected
//!      ▲                        │                                             │
//!      └────────backoff─────────┴─────────────────backoff─────────────────────┘
//! ```
//!
//! Every successful connect gets a fresh, strictly increasing connection id
//! and resets the backoff. Each message is timestamped on receipt, parsed,
//! validated, stamped with the connection id and handed to the writer queue
//! under the bucket of its receipt time. A full queue ends the connection;
//! a closed queue means the writer is gone and ends the consumer.
//!
//! Shutdown is observed while connecting, while waiting for a message and
//! while sleeping in backoff. On exit the queue is closed so the writer can
//! drain and finalize.

use depthrec_core::backoff::{Backoff, BackoffConfig};
use depthrec_core::config::InvalidMessagePolicy;
use depthrec_core::error::{DepthRecError, Result};
use depthrec_core::latency::FeedLagCollector;
use depthrec_core::queue::{EnqueueError, WriteQueue};
use depthrec_core::time_util;
use depthrec_core::types::{DepthDelta, WriteItem};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::feed::{Feed, FeedConnector};

/// Exchange-neutral content of one depth delta message.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthUpdate {
    pub event_time_ms: u64,
    pub first_update_id: u64,
    pub last_update_id: u64,
    pub bid_levels: Vec<Value>,
    pub ask_levels: Vec<Value>,
}

/// Decodes and validates one inbound text message.
pub type DepthParser = Box<dyn Fn(&str) -> Result<DepthUpdate> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub label: String,
    pub exchange: String,
    pub symbol: String,
    pub rotate_granularity_sec: u64,
    pub backoff: BackoffConfig,
    pub invalid_message_policy: InvalidMessagePolicy,
    /// Log feed lag every N kept messages; 0 disables periodic reports.
    pub lag_report_every: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub connections: u64,
    pub connect_failures: u64,
    pub messages_received: u64,
    pub records_enqueued: u64,
    pub invalid_messages: u64,
    pub queue_full_events: u64,
}

/// Why a connection ended.
enum Disconnect {
    Shutdown,
    RemoteClosed,
    Failed(DepthRecError),
    WriterGone,
}

pub struct StreamConsumer {
    config: ConsumerConfig,
    connector: Box<dyn FeedConnector>,
    parser: DepthParser,
    queue: WriteQueue,
    shutdown: watch::Receiver<bool>,
    backoff: Backoff,
    last_connection_id: u64,
    state: ConsumerState,
    stats: ConsumerStats,
    lag: FeedLagCollector,
}

impl StreamConsumer {
    pub fn new(
        config: ConsumerConfig,
        connector: Box<dyn FeedConnector>,
        parser: DepthParser,
        queue: WriteQueue,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let backoff = Backoff::new(config.backoff);
        Self {
            config,
            connector,
            parser,
            queue,
            shutdown,
            backoff,
            last_connection_id: 0,
            state: ConsumerState::Disconnected,
            stats: ConsumerStats::default(),
            lag: FeedLagCollector::new(),
        }
    }

    fn set_state(&mut self, next: ConsumerState) {
        if self.state != next {
            debug!("[{}] {:?} -> {:?}", self.config.label, self.state, next);
            self.state = next;
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Run until shutdown is signalled or the writer goes away.
    ///
    /// Returns `Err` only for the latter; connection-level failures are
    /// retried forever.
    pub async fn run(mut self) -> Result<ConsumerStats> {
        let label = self.config.label.clone();
        info!("[{label}] consumer started, endpoint {}", self.connector.endpoint());

        let outcome = self.run_inner(&label).await;
        self.set_state(ConsumerState::Disconnected);
        self.queue.close();

        let s = self.stats;
        info!(
            "[{label}] consumer exited: connections={} messages={} enqueued={} invalid={} queue_full={}",
            s.connections, s.messages_received, s.records_enqueued, s.invalid_messages, s.queue_full_events
        );
        outcome.map(|()| s)
    }

    async fn run_inner(&mut self, label: &str) -> Result<()> {
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            self.set_state(ConsumerState::Connecting);
            let attempt = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => return Ok(()),
                r = self.connector.connect() => r,
            };

            match attempt {
                Ok(mut feed) => {
                    self.last_connection_id += 1;
                    let conn_id = self.last_connection_id;
                    self.set_state(ConsumerState::Connected);
                    self.stats.connections += 1;
                    self.backoff.reset();
                    self.lag.reset();
                    info!("[{label}] connected, conn_id={conn_id}");

                    let reason = self.pump(&mut *feed, conn_id).await;
                    feed.close().await;
                    self.set_state(ConsumerState::Disconnected);
                    self.report_lag(label, conn_id);

                    match reason {
                        Disconnect::Shutdown => return Ok(()),
                        Disconnect::WriterGone => {
                            error!("[{label}] writer is gone, stopping consumer");
                            return Err(EnqueueError::Closed.into());
                        }
                        Disconnect::RemoteClosed => warn!("[{label}] conn_id={conn_id} closed by remote"),
                        Disconnect::Failed(e) => warn!("[{label}] conn_id={conn_id} failed: {e}"),
                    }
                }
                Err(e) => {
                    self.set_state(ConsumerState::Disconnected);
                    self.stats.connect_failures += 1;
                    warn!("[{label}] connect failed (attempt {}): {e}", self.backoff.attempt() + 1);
                }
            }

            let delay = self.backoff.next_delay();
            debug!("[{label}] reconnecting in {delay:?}");
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(&mut self, feed: &mut dyn Feed, conn_id: u64) -> Disconnect {
        loop {
            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => return Disconnect::Shutdown,
                r = feed.next_message() => r,
            };
            let received_at_ns = time_util::now_ns();

            match next {
                Ok(Some(text)) => {
                    if let Err(reason) = self.handle_message(&text, conn_id, received_at_ns) {
                        return reason;
                    }
                }
                Ok(None) => return Disconnect::RemoteClosed,
                Err(e) => return Disconnect::Failed(e),
            }
        }
    }

    fn handle_message(&mut self, text: &str, conn_id: u64, received_at_ns: u64) -> std::result::Result<(), Disconnect> {
        self.stats.messages_received += 1;

        let update = match (self.parser)(text) {
            Ok(update) => update,
            Err(e) => {
                self.stats.invalid_messages += 1;
                return match self.config.invalid_message_policy {
                    InvalidMessagePolicy::Skip => {
                        warn!("[{}] conn_id={conn_id} skipping invalid message: {e}", self.config.label);
                        Ok(())
                    }
                    InvalidMessagePolicy::Reconnect => Err(Disconnect::Failed(e)),
                };
            }
        };

        let delta = DepthDelta {
            exchange: self.config.exchange.clone(),
            symbol: self.config.symbol.clone(),
            connection_id: conn_id,
            received_at_ns,
            event_time_ms: update.event_time_ms,
            first_update_id: update.first_update_id,
            last_update_id: update.last_update_id,
            bid_levels: update.bid_levels,
            ask_levels: update.ask_levels,
        };

        let line = delta.to_line().map_err(|e| Disconnect::Failed(e.into()))?;
        let bucket = time_util::bucket_for_ns(received_at_ns, self.config.rotate_granularity_sec);

        match self.queue.enqueue(WriteItem::new(bucket, line)) {
            Ok(()) => self.stats.records_enqueued += 1,
            Err(e @ EnqueueError::Full { .. }) => {
                self.stats.queue_full_events += 1;
                error!("[{}] conn_id={conn_id}: {e}", self.config.label);
                return Err(Disconnect::Failed(e.into()));
            }
            Err(EnqueueError::Closed) => return Err(Disconnect::WriterGone),
        }

        self.lag.record(delta.feed_lag_us());
        let every = self.config.lag_report_every;
        if every > 0 && self.lag.count() % every == 0 {
            self.report_lag(&self.config.label, conn_id);
        }
        Ok(())
    }

    fn report_lag(&self, label: &str, conn_id: u64) {
        if let Some(stats) = self.lag.stats() {
            info!("[{label}] conn_id={conn_id} feed lag: {stats}");
        }
    }
}

/// Resolves once shutdown is requested or the sender is dropped.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
