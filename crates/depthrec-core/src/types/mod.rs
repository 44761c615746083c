//! Core data types flowing through the capture pipeline.
//!
//! [`DepthDelta`] is the record produced by the stream consumer and persisted
//! one-per-line; [`WriteItem`] is the unit handed from the consumer to the
//! writer through the write queue.

pub mod depth;
pub mod write;

pub use depth::*;
pub use write::*;
