//! Bounded sample reservoir backing histogram metrics.

use std::collections::VecDeque;

use serde::Serialize;

/// Capped FIFO reservoir of recent histogram samples.
///
/// `count` and `sum` cover every value ever recorded; the retained samples
/// only feed percentile estimation. Oldest samples are evicted once the
/// capacity is exceeded.
#[derive(Clone, Debug)]
pub struct Reservoir {
    samples: VecDeque<f64>,
    capacity: usize,
    count: u64,
    sum: f64,
}

impl Reservoir {
    /// Creates a reservoir retaining at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            count: 0,
            sum: 0.0,
        }
    }

    /// Records a value, evicting the oldest sample when full.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.samples.push_back(value);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Returns the total number of recorded values.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Returns the running sum of recorded values.
    #[must_use]
    pub const fn sum(&self) -> f64 {
        self.sum
    }

    /// Returns the mean over all recorded values, or 0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.sum / self.count as f64
            }
        }
    }

    /// Computes count, sum, and nearest-rank percentiles over the retained
    /// samples. Deterministic given the current reservoir contents.
    #[must_use]
    pub fn stats(&self) -> HistogramStats {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        HistogramStats {
            count: self.count,
            sum: self.sum,
            mean: self.mean(),
            p50: nearest_rank(&sorted, 0.50),
            p95: nearest_rank(&sorted, 0.95),
            p99: nearest_rank(&sorted, 0.99),
        }
    }
}

/// Selects the nearest-rank percentile from an already sorted slice.
fn nearest_rank(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = ((sorted.len() as f64 * quantile) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Point-in-time summary of a histogram series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HistogramStats {
    /// Total number of recorded values.
    pub count: u64,
    /// Sum of all recorded values.
    pub sum: f64,
    /// Mean over all recorded values.
    pub mean: f64,
    /// 50th percentile of the retained samples.
    pub p50: f64,
    /// 95th percentile of the retained samples.
    pub p95: f64,
    /// 99th percentile of the retained samples.
    pub p99: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_are_ordered() {
        let mut reservoir = Reservoir::new(256);
        for i in 0..100 {
            reservoir.push(f64::from(i));
        }
        let stats = reservoir.stats();
        assert!(stats.p50 <= stats.p95);
        assert!(stats.p95 <= stats.p99);
        assert_eq!(stats.count, 100);
        assert_eq!(stats.sum, 4950.0);
    }

    #[test]
    fn eviction_keeps_running_totals() {
        let mut reservoir = Reservoir::new(4);
        for i in 1..=10 {
            reservoir.push(f64::from(i));
        }
        assert_eq!(reservoir.count(), 10);
        assert_eq!(reservoir.sum(), 55.0);
        // Only the last four samples feed percentiles.
        let stats = reservoir.stats();
        assert!(stats.p50 >= 7.0);
    }

    #[test]
    fn single_sample_collapses_percentiles() {
        let mut reservoir = Reservoir::new(16);
        reservoir.push(42.0);
        let stats = reservoir.stats();
        assert_eq!(stats.p50, 42.0);
        assert_eq!(stats.p95, 42.0);
        assert_eq!(stats.p99, 42.0);
    }
}
