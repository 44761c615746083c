//! Feed-lag histogram: local receipt time minus exchange event time.
//!
//! Each connection owns one [`FeedLagCollector`]. Lag is recorded in
//! microseconds into fixed 100µs bins covering 0–1s; larger samples land in
//! the last bin but still count towards `max` and the average. The stream
//! consumer logs a summary periodically and when a connection ends.

use std::fmt;

const BIN_WIDTH_US: u64 = 100;

/// 10 000 bins × 100µs = 1s.
const NUM_BINS: usize = 10_000;

/// Summary of recorded feed lag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedLagStats {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub avg_us: f64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
}

impl fmt::Display for FeedLagStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} min={}µs max={}µs avg={:.1}µs p50={}µs p90={}µs p99={}µs",
            self.count, self.min_us, self.max_us, self.avg_us, self.p50_us, self.p90_us, self.p99_us,
        )
    }
}

/// Not thread-safe; one per connection.
#[derive(Debug, Clone)]
pub struct FeedLagCollector {
    bins: Vec<u64>,
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl FeedLagCollector {
    pub fn new() -> Self {
        Self { bins: vec![0; NUM_BINS], count: 0, sum: 0, min: u64::MAX, max: 0 }
    }

    #[inline]
    pub fn record(&mut self, lag_us: u64) {
        self.count += 1;
        self.sum = self.sum.saturating_add(lag_us);
        self.min = self.min.min(lag_us);
        self.max = self.max.max(lag_us);

        let bin = ((lag_us / BIN_WIDTH_US) as usize).min(NUM_BINS - 1);
        self.bins[bin] += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `None` until at least one sample has been recorded.
    pub fn stats(&self) -> Option<FeedLagStats> {
        if self.count == 0 {
            return None;
        }
        Some(FeedLagStats {
            count: self.count,
            min_us: self.min,
            max_us: self.max,
            avg_us: self.sum as f64 / self.count as f64,
            p50_us: self.percentile(0.50),
            p90_us: self.percentile(0.90),
            p99_us: self.percentile(0.99),
        })
    }

    pub fn reset(&mut self) {
        self.bins.fill(0);
        self.count = 0;
        self.sum = 0;
        self.min = u64::MAX;
        self.max = 0;
    }

    /// Lower edge of the bin holding the `pct` quantile, or `max` when the
    /// quantile falls in the overflow bin.
    fn percentile(&self, pct: f64) -> u64 {
        let target = ((self.count as f64 * pct).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (i, &n) in self.bins.iter().enumerate() {
            cumulative += n;
            if cumulative >= target {
                if i == NUM_BINS - 1 {
                    return self.max;
                }
                return i as u64 * BIN_WIDTH_US;
            }
        }
        self.max
    }
}

impl Default for FeedLagCollector {
    fn default() -> Self {
        Self::new()
    }
}
