//! Connection seam between the stream consumer and the network.
//!
//! The consumer only needs "open a connection" and "give me the next text
//! message"; [`WsConnector`] provides both over a real WebSocket, tests plug
//! in scripted feeds.

use async_trait::async_trait;
use depthrec_core::error::Result;
use depthrec_core::ws::{WsConnConfig, WsFeed};

/// One live connection.
#[async_trait]
pub trait Feed: Send {
    /// Next inbound text message. `Ok(None)` means the remote closed cleanly.
    async fn next_message(&mut self) -> Result<Option<String>>;

    /// Best-effort close.
    async fn close(&mut self) {}
}

/// Opens connections to one endpoint.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Feed>>;

    /// Endpoint description for log lines.
    fn endpoint(&self) -> &str;
}

pub struct WsConnector {
    config: WsConnConfig,
}

impl WsConnector {
    pub fn new(config: WsConnConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Feed>> {
        let feed = WsFeed::connect(&self.config).await?;
        Ok(Box::new(feed))
    }

    fn endpoint(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl Feed for WsFeed {
    async fn next_message(&mut self) -> Result<Option<String>> {
        self.next_text().await
    }

    async fn close(&mut self) {
        WsFeed::close(self).await;
    }
}
