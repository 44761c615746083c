//! Wall-clock timestamps and time-bucket arithmetic.
//!
//! Receipt timestamps use `clock_gettime(CLOCK_REALTIME)` on Linux and
//! `SystemTime` elsewhere. Buckets are derived from the realtime clock and
//! therefore follow it when it steps backwards; callers must tolerate that.

use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Linux: use clock_gettime for maximum precision
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
#[inline]
fn clock_realtime() -> (u64, u64) {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid, writable timespec and CLOCK_REALTIME always
    // exists. On failure `ts` stays zeroed.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    if rc != 0 {
        return system_realtime();
    }
    (ts.tv_sec as u64, ts.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
#[inline]
fn clock_realtime() -> (u64, u64) {
    system_realtime()
}

#[inline]
fn system_realtime() -> (u64, u64) {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (d.as_secs(), d.subsec_nanos() as u64)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Current time as **nanoseconds** since Unix epoch.
#[inline]
pub fn now_ns() -> u64 {
    let (sec, nsec) = clock_realtime();
    sec * NANOS_PER_SEC + nsec
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    let (sec, nsec) = clock_realtime();
    sec * 1_000 + nsec / 1_000_000
}

/// Current time as whole **seconds** since Unix epoch.
#[inline]
pub fn unix_secs() -> u64 {
    clock_realtime().0
}

/// Bucket id for a receipt timestamp: whole `granularity_secs` periods since
/// the epoch. With the default granularity of 60 this is minutes since epoch.
#[inline]
pub fn bucket_for_ns(ts_ns: u64, granularity_secs: u64) -> u64 {
    (ts_ns / NANOS_PER_SEC) / granularity_secs.max(1)
}
