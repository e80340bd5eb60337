//! Statistical anomaly detection over rolling metric baselines.

use std::collections::{HashMap, VecDeque};

/// Flags values far from a rolling per-metric baseline.
///
/// Keeps a sliding window of recent values per metric; once the window is
/// full, a value more than `threshold_stddevs` sample standard deviations
/// from the window mean is an anomaly. The value is appended to the window
/// either way, so the baseline keeps tracking the signal.
#[derive(Debug)]
pub struct AnomalyDetector {
    window_size: usize,
    threshold_stddevs: f64,
    history: HashMap<String, VecDeque<f64>>,
}

impl AnomalyDetector {
    /// Creates a detector with the supplied window size and stddev factor.
    #[must_use]
    pub fn new(window_size: usize, threshold_stddevs: f64) -> Self {
        Self {
            window_size: window_size.max(2),
            threshold_stddevs,
            history: HashMap::new(),
        }
    }

    /// Feeds one observation and reports whether it is anomalous.
    ///
    /// Returns `false` until the window has filled.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe(&mut self, metric_name: &str, value: f64) -> bool {
        let window = self
            .history
            .entry(metric_name.to_owned())
            .or_insert_with(|| VecDeque::with_capacity(self.window_size));

        if window.len() < self.window_size {
            window.push_back(value);
            return false;
        }

        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let variance = window
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (window.len() - 1) as f64;
        let stddev = variance.sqrt();

        let is_anomaly = (value - mean).abs() > self.threshold_stddevs * stddev;

        window.push_back(value);
        while window.len() > self.window_size {
            window.pop_front();
        }

        is_anomaly
    }

    /// Drops all accumulated baselines.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(20, 3.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_signal_then_spike_flags_once() {
        let mut detector = AnomalyDetector::new(10, 3.0);
        for _ in 0..30 {
            assert!(!detector.observe("latency.ms", 100.0));
        }

        // A constant baseline has zero stddev; the spike stands out.
        assert!(detector.observe("latency.ms", 100_000.0));
    }

    #[test]
    fn no_detection_before_window_fills() {
        let mut detector = AnomalyDetector::new(10, 3.0);
        for _ in 0..9 {
            assert!(!detector.observe("m", 5.0));
        }
        // Tenth observation still fills the window.
        assert!(!detector.observe("m", 1_000.0));
    }

    #[test]
    fn metrics_keep_independent_baselines() {
        let mut detector = AnomalyDetector::new(3, 3.0);
        for value in [1.0, 1.0, 1.0] {
            detector.observe("a", value);
        }
        for value in [1_000.0, 1_002.0, 998.0] {
            detector.observe("b", value);
        }
        assert!(detector.observe("a", 500.0));
        // Within three stddevs of b's baseline.
        assert!(!detector.observe("b", 1_001.0));
    }
}
