//! WebSocket feed client with keep-alive and dead-connection detection.

pub mod client;

pub use client::{WsConnConfig, WsFeed};
