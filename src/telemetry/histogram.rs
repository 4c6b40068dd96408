//! Lightweight latency histogram with fixed bucket boundaries, used for
//! the response-time p-avg rollup in the metrics surface and for the
//! order-book channel queue-wait stats (§5).

use std::sync::atomic::{AtomicU64, Ordering};

const BUCKETS_US: [u64; 10] = [100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000];

pub struct LatencyHistogram {
    buckets: [AtomicU64; BUCKETS_US.len() + 1],
    count: AtomicU64,
    sum_us: AtomicU64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
        }
    }

    pub fn record_us(&self, value_us: u64) {
        let idx = BUCKETS_US.iter().position(|b| value_us <= *b).unwrap_or(BUCKETS_US.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(value_us, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_us(&self) -> f64 {
        let n = self.count();
        if n == 0 {
            0.0
        } else {
            self.sum_us.load(Ordering::Relaxed) as f64 / n as f64
        }
    }

    /// Approximate percentile by walking cumulative bucket counts; returns
    /// the bucket's upper bound, not the interpolated value.
    pub fn percentile_us(&self, p: f64) -> u64 {
        let n = self.count();
        if n == 0 {
            return 0;
        }
        let target = (p.clamp(0.0, 1.0) * n as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target {
                return BUCKETS_US.get(i).copied().unwrap_or(*BUCKETS_US.last().unwrap());
            }
        }
        *BUCKETS_US.last().unwrap()
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_percentile_track_recorded_values() {
        let hist = LatencyHistogram::new();
        for v in [100, 200, 300, 400, 500] {
            hist.record_us(v);
        }
        assert_eq!(hist.count(), 5);
        assert!(hist.mean_us() > 0.0);
        assert!(hist.percentile_us(0.99) >= hist.percentile_us(0.5));
    }
}
