//! Normalization pass over a raw log directory.
//!
//! ```text
//! <base>/raw/deltas_utcmin_<b>[.<n>].jsonl
//!   ──► <base>/normalized/deltas_utcmin_<b>[.<n>].fp.jsonl
//!   ──► <base>/audit/deltas_utcmin_<b>[.<n>].audit.json
//! ```
//!
//! Only finalized raw files are read; `.tmp` segments are still being
//! written and are ignored. Both outputs go through `.tmp` + rename, the
//! audit last, so an audit on disk means the normalized file next to it is
//! complete. A raw file with both outputs present is skipped, which makes
//! re-running a pass a no-op.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use depthrec_core::time_util;
use depthrec_core::validate::validate_raw_record;
use depthrec_core::writer::{DEFAULT_FILE_PREFIX, TMP_SUFFIX, parse_segment_file_name};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditRecord, AuditStats};
use crate::continuity::ContinuityTracker;
use crate::normalize::normalize_record;

pub const NORMALIZED_DIR: &str = "normalized";
pub const AUDIT_DIR: &str = "audit";
pub const NORMALIZED_SUFFIX: &str = ".fp.jsonl";
pub const AUDIT_SUFFIX: &str = ".audit.json";

/// Where the outputs for one raw file go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub normalized: PathBuf,
    pub audit: PathBuf,
}

impl OutputPaths {
    pub fn for_raw_file(raw_file: &Path, normalized_dir: &Path, audit_dir: &Path) -> Self {
        let stem = raw_file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Self {
            normalized: normalized_dir.join(format!("{stem}{NORMALIZED_SUFFIX}")),
            audit: audit_dir.join(format!("{stem}{AUDIT_SUFFIX}")),
        }
    }

    pub fn both_exist(&self) -> bool {
        self.normalized.is_file() && self.audit.is_file()
    }
}

/// Outcome of [`process_raw_dir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub processed: usize,
    /// Already had both outputs.
    pub skipped: usize,
    /// Hit an I/O error; retried on the next pass.
    pub failed: usize,
    /// Processed files whose audit reports at least one gap.
    pub files_with_gaps: usize,
}

/// Finalized raw files in `raw_dir`, ordered by `(bucket, segment)`.
pub fn list_raw_files(raw_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(raw_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(key) = name.to_str().and_then(|n| parse_segment_file_name(DEFAULT_FILE_PREFIX, n)) {
            files.push((key, entry.path()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Normalize and audit every pending raw file of `raw_dir`.
///
/// Outputs land in `normalized/` and `audit/` next to `raw_dir`. Per-file
/// I/O errors are logged and counted; the pass moves on to the next file.
pub fn process_raw_dir(raw_dir: &Path) -> anyhow::Result<PassSummary> {
    let raw_dir = fs::canonicalize(raw_dir).with_context(|| format!("raw dir {}", raw_dir.display()))?;
    let base = raw_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| raw_dir.clone());
    let normalized_dir = base.join(NORMALIZED_DIR);
    let audit_dir = base.join(AUDIT_DIR);
    fs::create_dir_all(&normalized_dir).with_context(|| format!("create {}", normalized_dir.display()))?;
    fs::create_dir_all(&audit_dir).with_context(|| format!("create {}", audit_dir.display()))?;

    let raw_files = list_raw_files(&raw_dir).with_context(|| format!("list {}", raw_dir.display()))?;
    info!("[normalize] {}: {} raw files", raw_dir.display(), raw_files.len());

    let mut summary = PassSummary::default();
    for raw_file in raw_files {
        let paths = OutputPaths::for_raw_file(&raw_file, &normalized_dir, &audit_dir);
        if paths.both_exist() {
            debug!("[normalize] {} already done", raw_file.display());
            summary.skipped += 1;
            continue;
        }

        match process_raw_file(&raw_file, &paths) {
            Ok(record) => {
                summary.processed += 1;
                let s = &record.stats;
                if s.continuity_ok {
                    info!("[normalize] {}: kept {}/{} lines", raw_file.display(), s.kept_lines, s.raw_lines);
                } else {
                    summary.files_with_gaps += 1;
                    warn!(
                        "[normalize] {}: kept {}/{} lines, {} gaps, first {:?}",
                        raw_file.display(),
                        s.kept_lines,
                        s.raw_lines,
                        s.gaps,
                        s.first_gap
                    );
                }
            }
            Err(e) => {
                summary.failed += 1;
                error!("[normalize] {} failed: {e}", raw_file.display());
            }
        }
    }

    info!(
        "[normalize] pass done: processed={} skipped={} failed={} with_gaps={}",
        summary.processed, summary.skipped, summary.failed, summary.files_with_gaps
    );
    Ok(summary)
}

/// Normalize one raw file and write both outputs. Always overwrites.
pub fn process_raw_file(raw_file: &Path, paths: &OutputPaths) -> io::Result<AuditRecord> {
    let mut reader = BufReader::new(File::open(raw_file)?);

    let normalized_tmp = tmp_path(&paths.normalized);
    let mut out = BufWriter::new(File::create(&normalized_tmp)?);

    let mut stats = AuditStats::default();
    let mut continuity = ContinuityTracker::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        stats.raw_lines += 1;

        let Ok(raw) = serde_json::from_slice::<Value>(&line) else {
            stats.bad_json += 1;
            continue;
        };
        if let Err(e) = validate_raw_record(&raw) {
            debug!("[normalize] {}:{} schema: {e}", raw_file.display(), stats.raw_lines);
            stats.skipped_schema += 1;
            continue;
        }
        let delta = match normalize_record(&raw) {
            Ok(delta) => delta,
            Err(e) => {
                debug!("[normalize] {}:{} {e}", raw_file.display(), stats.raw_lines);
                stats.normalize_errors += 1;
                continue;
            }
        };

        stats.kept_lines += 1;
        continuity.observe(delta.first_update_id, delta.last_update_id, stats.raw_lines);

        serde_json::to_writer(&mut out, &delta)?;
        out.write_all(b"\n")?;
    }

    out.flush()?;
    drop(out);
    fs::rename(&normalized_tmp, &paths.normalized)?;

    stats.continuity_ok = continuity.is_continuous();
    stats.gaps = continuity.gaps();
    stats.first_gap = continuity.first_gap().cloned();

    let record = AuditRecord {
        raw_file: raw_file.display().to_string(),
        normalized_file: paths.normalized.display().to_string(),
        created_at_unix: time_util::unix_secs(),
        stats,
    };
    write_atomically(&paths.audit, &serde_json::to_vec_pretty(&record)?)?;
    Ok(record)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
