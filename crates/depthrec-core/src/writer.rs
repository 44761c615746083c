//! Append-only JSONL writer with time-bucketed rotation.
//!
//! One file is open at a time, keyed by bucket id. Lines are buffered in
//! memory and flushed on a count or time threshold. When the bucket changes
//! (or on close) the open file is finalized: remaining bytes are written to
//! `<name>.tmp`, the handle is closed, and the tmp file is renamed to
//! `<name>`. A file under its final name is therefore always complete.
//!
//! # File naming
//!
//! ```text
//! deltas_utcmin_<bucket>.jsonl        first segment for a bucket
//! deltas_utcmin_<bucket>.<n>.jsonl    later segments (bucket revisited)
//! <any of the above>.tmp              segment still being written
//! ```
//!
//! A finalized file is never reopened or overwritten. A bucket that comes
//! back (clock step, restart) gets the next free segment; a leftover `.tmp`
//! for that segment is opened in append mode and continued.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::cpu_affinity;
use crate::queue::{Dequeued, QueueReceiver};
use crate::types::{BucketId, WriteItem};

pub const DEFAULT_FILE_PREFIX: &str = "deltas_utcmin_";
pub const DEFAULT_BATCH_SIZE: usize = 2000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);
pub const TMP_SUFFIX: &str = ".tmp";

/// Writer settings, resolved from the stream config.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub out_dir: PathBuf,
    pub file_prefix: String,
    /// Flush after this many buffered lines.
    pub batch_size: usize,
    /// Flush when the oldest unflushed line is at least this old.
    pub flush_interval: Duration,
    /// `fsync` each file before its final rename.
    pub fsync_on_finalize: bool,
    /// Pin the writer thread to this core.
    pub cpu_core: Option<i32>,
}

impl WriterConfig {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            fsync_on_finalize: false,
            cpu_core: None,
        }
    }
}

/// Final file name of segment `segment` of `bucket`.
pub fn segment_file_name(prefix: &str, bucket: BucketId, segment: u32) -> String {
    if segment == 0 {
        format!("{prefix}{bucket}.jsonl")
    } else {
        format!("{prefix}{bucket}.{segment}.jsonl")
    }
}

/// Inverse of [`segment_file_name`]: `(bucket, segment)` for a finalized
/// segment name, `None` for anything else (including `.tmp` files).
pub fn parse_segment_file_name(prefix: &str, name: &str) -> Option<(BucketId, u32)> {
    let stem = name.strip_prefix(prefix)?.strip_suffix(".jsonl")?;
    match stem.split_once('.') {
        None => Some((stem.parse().ok()?, 0)),
        Some((bucket, segment)) => {
            let segment: u32 = segment.parse().ok()?;
            if segment == 0 {
                return None;
            }
            Some((bucket.parse().ok()?, segment))
        }
    }
}

/// Counters reported when the writer shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub items_written: u64,
    pub bytes_written: u64,
    pub flushes: u64,
    pub files_finalized: u64,
}

#[derive(Debug)]
struct OpenSegment {
    file: File,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

/// Mutable rotation state. Owned by exactly one writer, never shared.
#[derive(Debug)]
pub struct RotationState {
    current_bucket: Option<BucketId>,
    open: Option<OpenSegment>,
    pending: Vec<Vec<u8>>,
    last_flush: Instant,
}

impl RotationState {
    fn new() -> Self {
        Self { current_bucket: None, open: None, pending: Vec::new(), last_flush: Instant::now() }
    }

    pub fn current_bucket(&self) -> Option<BucketId> {
        self.current_bucket
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Single-owner rotating writer. See the module docs for the file protocol.
#[derive(Debug)]
pub struct RotatingLogWriter {
    config: WriterConfig,
    state: RotationState,
    stats: WriterStats,
}

impl RotatingLogWriter {
    pub fn new(config: WriterConfig) -> Self {
        Self { config, state: RotationState::new(), stats: WriterStats::default() }
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Path of the segment currently being written (its `.tmp` name).
    pub fn open_tmp_path(&self) -> Option<&Path> {
        self.state.open.as_ref().map(|s| s.tmp_path.as_path())
    }

    /// Append one record, rotating first if its bucket differs from the open one.
    pub fn write(&mut self, item: WriteItem) -> io::Result<()> {
        if self.state.current_bucket != Some(item.bucket) {
            self.finalize_current()?;
            self.open_bucket(item.bucket)?;
        }

        self.state.pending.push(item.payload);

        if self.state.pending.len() >= self.config.batch_size
            || self.state.last_flush.elapsed() >= self.config.flush_interval
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush buffered lines if the time threshold has passed. Called when the
    /// queue is idle so quiet feeds still reach the OS promptly.
    pub fn flush_if_due(&mut self) -> io::Result<()> {
        if !self.state.pending.is_empty() && self.state.last_flush.elapsed() >= self.config.flush_interval
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Write all buffered lines to the open segment.
    pub fn flush(&mut self) -> io::Result<()> {
        let Some(open) = self.state.open.as_mut() else {
            return Ok(());
        };
        if !self.state.pending.is_empty() {
            let batch = self.state.pending.concat();
            open.file.write_all(&batch)?;
            open.file.flush()?;

            self.stats.items_written += self.state.pending.len() as u64;
            self.stats.bytes_written += batch.len() as u64;
            self.stats.flushes += 1;
            self.state.pending.clear();
        }
        self.state.last_flush = Instant::now();
        Ok(())
    }

    /// Final flush and finalize of the open segment, consuming the writer.
    pub fn close(mut self) -> io::Result<WriterStats> {
        self.finalize_current()?;
        Ok(self.stats)
    }

    fn finalize_current(&mut self) -> io::Result<()> {
        if self.state.open.is_none() {
            return Ok(());
        }
        self.flush()?;

        if let Some(open) = self.state.open.take() {
            if self.config.fsync_on_finalize {
                open.file.sync_all()?;
            }
            drop(open.file);
            fs::rename(&open.tmp_path, &open.final_path)?;
            self.stats.files_finalized += 1;
            info!("finalized {}", open.final_path.display());
        }
        self.state.current_bucket = None;
        Ok(())
    }

    fn open_bucket(&mut self, bucket: BucketId) -> io::Result<()> {
        fs::create_dir_all(&self.config.out_dir)?;

        let (final_path, segment) = self.next_free_segment(bucket);
        let mut tmp_name = final_path.clone().into_os_string();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        let file = OpenOptions::new().create(true).append(true).open(&tmp_path)?;
        debug!("opened {} (bucket={bucket}, segment={segment})", tmp_path.display());

        self.state.open = Some(OpenSegment { file, tmp_path, final_path });
        self.state.current_bucket = Some(bucket);
        self.state.last_flush = Instant::now();
        Ok(())
    }

    fn next_free_segment(&self, bucket: BucketId) -> (PathBuf, u32) {
        let mut segment = 0u32;
        loop {
            let path = self
                .config
                .out_dir
                .join(segment_file_name(&self.config.file_prefix, bucket, segment));
            if !path.exists() {
                return (path, segment);
            }
            segment += 1;
        }
    }
}

/// Drain `rx` into a [`RotatingLogWriter`] until the queue is closed, then
/// finalize. Runs on the calling (blocking) thread.
///
/// Filesystem errors end the loop immediately and are returned; the open
/// segment stays under its `.tmp` name.
pub fn run_writer_loop(label: &str, rx: QueueReceiver, config: WriterConfig) -> io::Result<WriterStats> {
    cpu_affinity::pin_current_thread(label, config.cpu_core);
    let idle = config.flush_interval.max(Duration::from_millis(1));
    let mut writer = RotatingLogWriter::new(config);

    info!("[{label}] writer loop started");

    loop {
        let step = match rx.dequeue_timeout(idle) {
            Dequeued::Item(item) => writer.write(item),
            Dequeued::Idle => writer.flush_if_due(),
            Dequeued::Closed => break,
        };
        if let Err(e) = step {
            error!("[{label}] write failed, writer stopping: {e}");
            return Err(e);
        }
    }

    match writer.close() {
        Ok(stats) => {
            info!(
                "[{label}] writer loop exited: items={} bytes={} files={}",
                stats.items_written, stats.bytes_written, stats.files_finalized
            );
            Ok(stats)
        }
        Err(e) => {
            error!("[{label}] final finalize failed: {e}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::write_queue;
    use tempfile::tempdir;

    fn line(tag: &str) -> Vec<u8> {
        format!("{{\"tag\":\"{tag}\"}}\n").into_bytes()
    }

    fn config(dir: &Path) -> WriterConfig {
        let mut cfg = WriterConfig::new(dir);
        cfg.flush_interval = Duration::from_secs(3600);
        cfg
    }

    fn read(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap()
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn segment_names_parse_back() {
        let p = DEFAULT_FILE_PREFIX;
        assert_eq!(parse_segment_file_name(p, &segment_file_name(p, 28_000_000, 0)), Some((28_000_000, 0)));
        assert_eq!(parse_segment_file_name(p, &segment_file_name(p, 28_000_000, 3)), Some((28_000_000, 3)));
        assert_eq!(parse_segment_file_name(p, "deltas_utcmin_100.jsonl.tmp"), None);
        assert_eq!(parse_segment_file_name(p, "deltas_utcmin_100.fp.jsonl"), None);
        assert_eq!(parse_segment_file_name(p, "deltas_utcmin_100.0.jsonl"), None);
        assert_eq!(parse_segment_file_name(p, "other_100.jsonl"), None);
    }

    #[test]
    fn revisited_bucket_gets_its_own_segment() {
        let dir = tempdir().unwrap();
        let mut w = RotatingLogWriter::new(config(dir.path()));
        for (bucket, tag) in [(100, "a"), (100, "b"), (101, "c"), (101, "d"), (100, "e")] {
            w.write(WriteItem::new(bucket, line(tag))).unwrap();
        }
        let stats = w.close().unwrap();

        assert_eq!(
            file_names(dir.path()),
            vec!["deltas_utcmin_100.1.jsonl", "deltas_utcmin_100.jsonl", "deltas_utcmin_101.jsonl"]
        );
        assert_eq!(read(dir.path(), "deltas_utcmin_100.jsonl"), "{\"tag\":\"a\"}\n{\"tag\":\"b\"}\n");
        assert_eq!(read(dir.path(), "deltas_utcmin_101.jsonl"), "{\"tag\":\"c\"}\n{\"tag\":\"d\"}\n");
        assert_eq!(read(dir.path(), "deltas_utcmin_100.1.jsonl"), "{\"tag\":\"e\"}\n");
        assert_eq!(stats.items_written, 5);
        assert_eq!(stats.files_finalized, 3);
    }

    #[test]
    fn open_segment_is_only_visible_as_tmp() {
        let dir = tempdir().unwrap();
        let mut w = RotatingLogWriter::new(config(dir.path()));
        w.write(WriteItem::new(5, line("x"))).unwrap();
        w.flush().unwrap();

        assert_eq!(file_names(dir.path()), vec!["deltas_utcmin_5.jsonl.tmp"]);
        assert_eq!(w.state().current_bucket(), Some(5));
        assert_eq!(w.open_tmp_path(), Some(dir.path().join("deltas_utcmin_5.jsonl.tmp").as_path()));

        w.write(WriteItem::new(6, line("y"))).unwrap();
        assert_eq!(file_names(dir.path()), vec!["deltas_utcmin_5.jsonl", "deltas_utcmin_6.jsonl.tmp"]);

        assert_eq!(w.open_tmp_path(), Some(dir.path().join("deltas_utcmin_6.jsonl.tmp").as_path()));

        w.close().unwrap();
        assert_eq!(file_names(dir.path()), vec!["deltas_utcmin_5.jsonl", "deltas_utcmin_6.jsonl"]);
    }

    #[test]
    fn count_threshold_flushes() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.batch_size = 3;
        let mut w = RotatingLogWriter::new(cfg);

        for tag in ["1", "2"] {
            w.write(WriteItem::new(1, line(tag))).unwrap();
        }
        assert_eq!(read(dir.path(), "deltas_utcmin_1.jsonl.tmp"), "");
        assert_eq!(w.state().pending_len(), 2);

        w.write(WriteItem::new(1, line("3"))).unwrap();
        assert_eq!(read(dir.path(), "deltas_utcmin_1.jsonl.tmp").lines().count(), 3);
        assert_eq!(w.state().pending_len(), 0);

        w.write(WriteItem::new(1, line("4"))).unwrap();
        assert_eq!(read(dir.path(), "deltas_utcmin_1.jsonl.tmp").lines().count(), 3);

        w.close().unwrap();
        assert_eq!(read(dir.path(), "deltas_utcmin_1.jsonl").lines().count(), 4);
    }

    #[test]
    fn time_threshold_flushes() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.flush_interval = Duration::ZERO;
        let mut w = RotatingLogWriter::new(cfg);

        w.write(WriteItem::new(1, line("now"))).unwrap();
        assert_eq!(read(dir.path(), "deltas_utcmin_1.jsonl.tmp"), "{\"tag\":\"now\"}\n");
        assert_eq!(w.stats().flushes, 1);
    }

    #[test]
    fn flush_if_due_respects_interval() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.flush_interval = Duration::from_millis(20);
        let mut w = RotatingLogWriter::new(cfg);

        w.write(WriteItem::new(1, line("q"))).unwrap();
        w.flush_if_due().unwrap();
        assert_eq!(w.state().pending_len(), 1);

        std::thread::sleep(Duration::from_millis(30));
        w.flush_if_due().unwrap();
        assert_eq!(w.state().pending_len(), 0);
        assert_eq!(read(dir.path(), "deltas_utcmin_1.jsonl.tmp"), "{\"tag\":\"q\"}\n");
    }

    #[test]
    fn leftover_tmp_is_continued() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("deltas_utcmin_9.jsonl.tmp"), "{\"tag\":\"old\"}\n").unwrap();

        let mut w = RotatingLogWriter::new(config(dir.path()));
        w.write(WriteItem::new(9, line("new"))).unwrap();
        w.close().unwrap();

        assert_eq!(file_names(dir.path()), vec!["deltas_utcmin_9.jsonl"]);
        assert_eq!(read(dir.path(), "deltas_utcmin_9.jsonl"), "{\"tag\":\"old\"}\n{\"tag\":\"new\"}\n");
    }

    #[test]
    fn existing_final_file_is_never_touched() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("deltas_utcmin_9.jsonl"), "{\"tag\":\"done\"}\n").unwrap();

        let mut w = RotatingLogWriter::new(config(dir.path()));
        w.write(WriteItem::new(9, line("later"))).unwrap();
        w.close().unwrap();

        assert_eq!(read(dir.path(), "deltas_utcmin_9.jsonl"), "{\"tag\":\"done\"}\n");
        assert_eq!(read(dir.path(), "deltas_utcmin_9.1.jsonl"), "{\"tag\":\"later\"}\n");
    }

    #[test]
    fn runs_map_one_to_one_onto_segments() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.batch_size = 4;
        let mut w = RotatingLogWriter::new(cfg);

        // Deterministic pseudo-random bucket walk with repeats and regressions.
        let mut seed = 0x2545_f491_u64;
        let mut input = Vec::new();
        for i in 0..400u32 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let bucket = 1_000 + (seed % 5);
            let bucket = if seed % 3 == 0 { input.last().map_or(bucket, |&(b, _)| b) } else { bucket };
            input.push((bucket, format!("{i}")));
            w.write(WriteItem::new(bucket, line(&i.to_string()))).unwrap();
        }
        w.close().unwrap();

        // Split the input into maximal runs of equal buckets; the k-th run of
        // bucket b must be exactly segment k of b.
        let mut seen: std::collections::HashMap<u64, u32> = Default::default();
        let mut idx = 0;
        let mut total_lines = 0;
        while idx < input.len() {
            let bucket = input[idx].0;
            let mut expected = String::new();
            while idx < input.len() && input[idx].0 == bucket {
                expected.push_str(&format!("{{\"tag\":\"{}\"}}\n", input[idx].1));
                idx += 1;
            }
            let segment = seen.entry(bucket).or_insert(0);
            let name = segment_file_name(DEFAULT_FILE_PREFIX, bucket, *segment);
            *segment += 1;
            let got = read(dir.path(), &name);
            total_lines += got.lines().count();
            assert_eq!(got, expected, "segment {name}");
        }
        assert_eq!(total_lines, input.len());
        assert!(file_names(dir.path()).iter().all(|n| !n.ends_with(TMP_SUFFIX)));
    }

    #[test]
    fn fsync_on_finalize() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.fsync_on_finalize = true;
        let mut w = RotatingLogWriter::new(cfg);
        w.write(WriteItem::new(3, line("s"))).unwrap();
        w.close().unwrap();
        assert_eq!(read(dir.path(), "deltas_utcmin_3.jsonl"), "{\"tag\":\"s\"}\n");
    }

    #[test]
    fn close_without_writes_creates_nothing() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("raw");
        let stats = RotatingLogWriter::new(config(&out)).close().unwrap();
        assert_eq!(stats, WriterStats::default());
        assert!(!out.exists());
    }

    #[test]
    fn writer_loop_drains_and_finalizes() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("raw");
        let (mut q, rx) = write_queue(16);

        let cfg = config(&out);
        let handle = std::thread::spawn(move || run_writer_loop("test", rx, cfg));

        for (bucket, tag) in [(1, "a"), (1, "b"), (2, "c")] {
            q.enqueue(WriteItem::new(bucket, line(tag))).unwrap();
        }
        q.close();

        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.items_written, 3);
        assert_eq!(stats.files_finalized, 2);
        assert_eq!(file_names(&out), vec!["deltas_utcmin_1.jsonl", "deltas_utcmin_2.jsonl"]);
    }

    #[test]
    fn writer_loop_reports_filesystem_failure() {
        let dir = tempdir().unwrap();
        // A regular file where the output directory should be.
        let blocker = dir.path().join("raw");
        fs::write(&blocker, b"").unwrap();

        let (mut q, rx) = write_queue(4);
        q.enqueue(WriteItem::new(1, line("a"))).unwrap();
        q.close();

        assert!(run_writer_loop("test", rx, config(&blocker)).is_err());
    }
}
