//! Per-file audit record.
//!
//! Written as `<raw-stem>.audit.json`:
//!
//! ```json
//! {
//!   "raw_file": "...", "normalized_file": "...", "created_at_unix": 1700000000,
//!   "stats": { "raw_lines": 3, "bad_json": 0, "skipped_schema": 0, "normalize_errors": 0,
//!              "kept_lines": 3, "continuity_ok": false, "gaps": 1,
//!              "first_gap": { "prev_u": 10, "U": 12, "u": 15, "line": 3 } }
//! }
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstGap {
    #[serde(rename = "prev_u")]
    pub prev_last_update_id: u64,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub last_update_id: u64,
    /// Raw line number (1-based, counting every line read so far).
    pub line: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub raw_lines: u64,
    pub bad_json: u64,
    pub skipped_schema: u64,
    pub normalize_errors: u64,
    pub kept_lines: u64,
    pub continuity_ok: bool,
    pub gaps: u64,
    pub first_gap: Option<FirstGap>,
}

impl Default for AuditStats {
    fn default() -> Self {
        Self {
            raw_lines: 0,
            bad_json: 0,
            skipped_schema: 0,
            normalize_errors: 0,
            kept_lines: 0,
            continuity_ok: true,
            gaps: 0,
            first_gap: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub raw_file: String,
    pub normalized_file: String,
    pub created_at_unix: u64,
    pub stats: AuditStats,
}
