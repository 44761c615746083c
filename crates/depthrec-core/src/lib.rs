//! # depthrec-core
//!
//! Core crate for the depth recorder, providing:
//!
//! - **Types** (`types`): `DepthDelta` records and `WriteItem` hand-off units
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): `DepthRecError` via thiserror
//! - **Validation** (`validate`): envelope checks for exchange messages and raw records
//! - **Write queue** (`queue`): bounded, fail-loud producer/consumer hand-off
//! - **Writer** (`writer`): time-bucketed JSONL writer with atomic finalize
//! - **Backoff** (`backoff`): exponential reconnect delay
//! - **WebSocket** (`ws`): feed client with keep-alive and idle detection
//! - **Feed lag** (`latency`): receipt-vs-event lag histogram
//! - **CPU affinity** (`cpu_affinity`): writer thread pinning
//! - **Time utilities** (`time_util`): receipt timestamps and bucket math
//! - **Logging** (`logging`): tracing-based structured logging

pub mod backoff;
pub mod config;
pub mod cpu_affinity;
pub mod error;
pub mod latency;
pub mod logging;
pub mod queue;
pub mod time_util;
pub mod types;
pub mod validate;
pub mod writer;
pub mod ws;

pub use types::*;
