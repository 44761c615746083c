//! # depthrec-norm
//!
//! Offline pass over finalized raw delta logs. For every raw file it writes a
//! normalized file (numeric price levels) and an audit record describing
//! what was kept, what was dropped and whether update ids were continuous.
//!
//! - [`normalize`]: raw record → [`normalize::NormalizedDelta`]
//! - [`continuity`]: update-id gap detection
//! - [`audit`]: per-file counters and the audit file layout
//! - [`pass`]: directory scan, idempotent per-file processing

pub mod audit;
pub mod continuity;
pub mod normalize;
pub mod pass;

pub use pass::{PassSummary, process_raw_dir, process_raw_file};
