//! Single WebSocket connection yielding text frames one at a time.
//!
//! Unlike a callback-driven client, [`WsFeed`] does not reconnect on its own:
//! the stream consumer owns the connection lifecycle (connection ids, backoff,
//! cancellation) and simply drops the feed on any error. While a caller is
//! waiting in [`WsFeed::next_text`] the feed:
//!
//! 1. answers server pings,
//! 2. sends its own ping every `ping_interval`,
//! 3. fails if no frame at all arrives within `idle_timeout`.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{DepthRecError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for one WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full URL, e.g. `wss://fstream.binance.com/ws/btcusdt@depth@100ms`.
    pub url: String,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Interval between client pings. `None` disables pinging.
    pub ping_interval: Option<Duration>,
    /// Maximum silence before the connection is considered dead.
    pub idle_timeout: Duration,
}

impl WsConnConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra_headers: HashMap::new(),
            ping_interval: Some(Duration::from_secs(15)),
            idle_timeout: Duration::from_secs(30),
        }
    }

    /// Check that the URL parses and uses a WebSocket scheme.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| DepthRecError::Config(format!("invalid url {:?}: {e}", self.url)))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(DepthRecError::Config(format!("unsupported url scheme {other:?} in {}", self.url))),
        }
    }
}

/// An established connection. Dropping it closes the socket.
pub struct WsFeed {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    ping: Option<Interval>,
    idle_timeout: Duration,
    /// Arrival of the last inbound frame of any kind.
    last_frame: Instant,
}

impl WsFeed {
    /// Perform the TCP/TLS/WebSocket handshake, bounded by `idle_timeout`.
    pub async fn connect(config: &WsConnConfig) -> Result<Self> {
        config.validate()?;

        let mut request = config.url.as_str().into_client_request()?;
        for (key, value) in &config.extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| DepthRecError::Config(format!("bad header name {key:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| DepthRecError::Config(format!("bad header value for {key:?}: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, response) =
            tokio::time::timeout(config.idle_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    DepthRecError::WebSocket(format!(
                        "handshake with {} timed out after {:?}",
                        config.url, config.idle_timeout
                    ))
                })??;
        debug!("handshake with {} done (status {})", config.url, response.status());

        let (write, read) = stream.split();
        let ping = config.ping_interval.filter(|d| !d.is_zero()).map(|d| {
            let mut interval = tokio::time::interval_at(Instant::now() + d, d);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        Ok(Self { write, read, ping, idle_timeout: config.idle_timeout, last_frame: Instant::now() })
    }

    /// Wait for the next data frame.
    ///
    /// Returns `Ok(None)` when the server closed the connection cleanly.
    /// Binary frames are accepted if they hold UTF-8. Only inbound frames
    /// move the idle deadline; our own pings do not.
    pub async fn next_text(&mut self) -> Result<Option<String>> {
        let Self { write, read, ping, idle_timeout, last_frame } = self;
        let idle_timeout = *idle_timeout;

        loop {
            let ping_tick = async {
                match ping.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                frame = read.next() => {
                    *last_frame = Instant::now();
                    match frame {
                        None | Some(Ok(Message::Close(_))) => return Ok(None),
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                        Some(Ok(Message::Binary(data))) => {
                            let text = String::from_utf8(data.to_vec())
                                .map_err(|e| DepthRecError::WebSocket(format!("non-utf8 binary frame: {e}")))?;
                            return Ok(Some(text));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(_)) => {} // Pong, raw Frame
                    }
                }

                _ = tokio::time::sleep_until(*last_frame + idle_timeout) => {
                    return Err(DepthRecError::WebSocket(format!(
                        "no frames for {idle_timeout:?}, connection presumed dead"
                    )));
                }

                _ = ping_tick => {
                    write.send(Message::Ping(Vec::new().into())).await?;
                }
            }
        }
    }

    /// Send a close frame. Errors are ignored; the socket is going away anyway.
    pub async fn close(&mut self) {
        let _ = self.write.close().await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::{WebSocketStream, accept_async};

    use super::*;

    /// Accept one WebSocket client on a loopback port and hand it to `session`.
    async fn serve<F, Fut>(session: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = accept_async(tcp).await.unwrap();
            session(ws).await;
        });
        format!("ws://{addr}/feed")
    }

    fn conn_config(url: String, ping: Option<Duration>, idle: Duration) -> WsConnConfig {
        let mut config = WsConnConfig::new(url);
        config.ping_interval = ping;
        config.idle_timeout = idle;
        config
    }

    async fn next(feed: &mut WsFeed) -> Result<Option<String>> {
        tokio::time::timeout(Duration::from_secs(5), feed.next_text()).await.expect("next_text hung")
    }

    #[test]
    fn accepts_websocket_urls() {
        assert!(WsConnConfig::new("wss://fstream.binance.com/ws/btcusdt@depth@100ms").validate().is_ok());
        assert!(WsConnConfig::new("ws://127.0.0.1:9000/feed").validate().is_ok());
    }

    #[test]
    fn rejects_other_urls() {
        assert!(matches!(WsConnConfig::new("https://example.com").validate(), Err(DepthRecError::Config(_))));
        assert!(matches!(WsConnConfig::new("not a url").validate(), Err(DepthRecError::Config(_))));
    }

    #[tokio::test]
    async fn yields_text_and_utf8_binary_then_none_on_close() {
        let url = serve(|mut ws| async move {
            ws.send(Message::text("a")).await.unwrap();
            ws.send(Message::binary(b"b".to_vec())).await.unwrap();
            ws.send(Message::Close(None)).await.unwrap();
            while ws.next().await.is_some() {}
        })
        .await;

        let mut feed = WsFeed::connect(&conn_config(url, None, Duration::from_secs(5))).await.unwrap();
        assert_eq!(next(&mut feed).await.unwrap().as_deref(), Some("a"));
        assert_eq!(next(&mut feed).await.unwrap().as_deref(), Some("b"));
        assert_eq!(next(&mut feed).await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_utf8_binary_is_an_error() {
        let url = serve(|mut ws| async move {
            ws.send(Message::binary(vec![0xff, 0xfe])).await.unwrap();
            std::future::pending::<()>().await;
        })
        .await;

        let mut feed = WsFeed::connect(&conn_config(url, None, Duration::from_secs(5))).await.unwrap();
        assert!(matches!(next(&mut feed).await, Err(DepthRecError::WebSocket(_))));
    }

    #[tokio::test]
    async fn answers_server_ping() {
        let url = serve(|mut ws| async move {
            ws.send(Message::Ping(b"hi".to_vec().into())).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Pong(data))) => {
                        assert_eq!(&data[..], b"hi");
                        break;
                    }
                    Some(Ok(_)) => {}
                    other => panic!("no pong: {other:?}"),
                }
            }
            ws.send(Message::text("ponged")).await.unwrap();
            std::future::pending::<()>().await;
        })
        .await;

        let mut feed = WsFeed::connect(&conn_config(url, None, Duration::from_secs(5))).await.unwrap();
        assert_eq!(next(&mut feed).await.unwrap().as_deref(), Some("ponged"));
    }

    #[tokio::test]
    async fn sends_pings_on_interval() {
        let url = serve(|mut ws| async move {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Ping(_))) => break,
                    Some(Ok(_)) => {}
                    other => panic!("no ping: {other:?}"),
                }
            }
            ws.send(Message::text("pinged")).await.unwrap();
            std::future::pending::<()>().await;
        })
        .await;

        let config = conn_config(url, Some(Duration::from_millis(50)), Duration::from_secs(5));
        let mut feed = WsFeed::connect(&config).await.unwrap();
        assert_eq!(next(&mut feed).await.unwrap().as_deref(), Some("pinged"));
    }

    #[tokio::test]
    async fn silent_peer_times_out_despite_pings() {
        let url = serve(|ws| async move {
            let _held = ws;
            std::future::pending::<()>().await;
        })
        .await;

        let config = conn_config(url, Some(Duration::from_millis(50)), Duration::from_millis(300));
        let mut feed = WsFeed::connect(&config).await.unwrap();
        let started = Instant::now();
        let err = next(&mut feed).await.unwrap_err();
        assert!(matches!(err, DepthRecError::WebSocket(ref m) if m.contains("no frames")), "{err}");
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        // Accepts TCP through the backlog but never answers the upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/feed", listener.local_addr().unwrap());

        let config = conn_config(url, None, Duration::from_millis(200));
        let result = tokio::time::timeout(Duration::from_secs(5), WsFeed::connect(&config)).await.unwrap();
        assert!(matches!(result, Err(DepthRecError::WebSocket(ref m)) if m.contains("timed out")));
        drop(listener);
    }
}
