//! Tick interval metrics.
//!
//! Keeps a fixed-size ring buffer of measured tick-to-tick intervals so that
//! recording never allocates once the collector is built. Overruns are
//! counted as reported by the dispatcher, not inferred from the samples,
//! since a tick that overran its budget may still be followed by a short one.

use serde::Serialize;
use std::time::Duration;

/// Tick interval metrics with a ring buffer for percentile queries.
#[derive(Debug)]
pub struct TickMetrics {
    samples: Box<[u64]>,
    write_pos: usize,
    sample_count: usize,
    total_ticks: u64,
    min_ns: u64,
    max_ns: u64,
    sum_ns: u128,
    overrun_count: u64,
    /// Interval the scheduler is currently aiming for.
    target_ns: u64,
}

impl TickMetrics {
    /// Create a collector retaining `histogram_size` samples.
    ///
    /// `target` is the interval currently aimed for; see [`TickMetrics::retarget`].
    #[must_use]
    pub fn new(histogram_size: usize, target: Duration) -> Self {
        let size = histogram_size.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total_ticks: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
            overrun_count: 0,
            target_ns: duration_ns(target),
        }
    }

    /// Record one measured tick interval.
    pub fn record(&mut self, interval: Duration, overrun: bool) {
        let ns = duration_ns(interval);

        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = (self.sample_count + 1).min(self.samples.len());

        self.total_ticks += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns += u128::from(ns);

        if overrun {
            self.overrun_count += 1;
        }
    }

    /// Update the interval being aimed for after a rate change.
    ///
    /// Samples already recorded are kept.
    pub fn retarget(&mut self, target: Duration) {
        self.target_ns = duration_ns(target);
    }

    /// Interval currently aimed for.
    #[must_use]
    pub fn target(&self) -> Duration {
        Duration::from_nanos(self.target_ns)
    }

    /// Total number of intervals recorded.
    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Number of ticks that overran their budget.
    #[must_use]
    pub fn overrun_count(&self) -> u64 {
        self.overrun_count
    }

    /// Shortest recorded interval.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.total_ticks > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Longest recorded interval.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.total_ticks > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Mean interval over every recorded tick, not only the retained window.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        self.mean_ns().map(Duration::from_nanos)
    }

    fn mean_ns(&self) -> Option<u64> {
        if self.total_ticks == 0 {
            return None;
        }
        let mean = self.sum_ns / u128::from(self.total_ticks);
        Some(u64::try_from(mean).unwrap_or(u64::MAX))
    }

    /// Percentile (0.0 to 100.0) over the retained window.
    ///
    /// Returns `None` without samples or for an out-of-range percentile.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        self.percentiles(&[percentile]).first().map(|&(_, d)| d)
    }

    /// Several percentiles over the retained window with one sort.
    ///
    /// Out-of-range and NaN percentiles are skipped.
    #[must_use]
    pub fn percentiles(&self, percentiles: &[f64]) -> Vec<(f64, Duration)> {
        if self.sample_count == 0 {
            return Vec::new();
        }

        let mut sorted = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();
        let last = sorted.len() - 1;

        percentiles
            .iter()
            .copied()
            .filter(|p| (0.0..=100.0).contains(p))
            .map(|p| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
                let idx = ((p / 100.0) * last as f64).round() as usize;
                (p, Duration::from_nanos(sorted[idx.min(last)]))
            })
            .collect()
    }

    /// Copy of the current aggregate figures.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let recorded = self.total_ticks > 0;
        MetricsSnapshot {
            total_ticks: self.total_ticks,
            target_ns: self.target_ns,
            min_ns: recorded.then_some(self.min_ns),
            max_ns: recorded.then_some(self.max_ns),
            mean_ns: self.mean_ns(),
            overrun_count: self.overrun_count,
            sample_count: self.sample_count,
        }
    }

    /// Clear every sample and counter, keeping the target.
    pub fn reset(&mut self) {
        self.samples.fill(0);
        self.write_pos = 0;
        self.sample_count = 0;
        self.total_ticks = 0;
        self.min_ns = u64::MAX;
        self.max_ns = 0;
        self.sum_ns = 0;
        self.overrun_count = 0;
    }
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Immutable snapshot of tick metrics for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Intervals recorded.
    pub total_ticks: u64,
    /// Interval aimed for, in nanoseconds.
    pub target_ns: u64,
    /// Shortest interval in nanoseconds.
    pub min_ns: Option<u64>,
    /// Longest interval in nanoseconds.
    pub max_ns: Option<u64>,
    /// Mean interval in nanoseconds.
    pub mean_ns: Option<u64>,
    /// Ticks that overran their budget.
    pub overrun_count: u64,
    /// Samples currently retained.
    pub sample_count: usize,
}

impl MetricsSnapshot {
    /// Jitter (max - min) in nanoseconds.
    #[must_use]
    pub fn jitter_ns(&self) -> Option<u64> {
        match (self.min_ns, self.max_ns) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        }
    }

    /// Signed difference between the mean and the target interval.
    #[must_use]
    pub fn mean_error_ns(&self) -> Option<i64> {
        self.mean_ns.map(|mean| {
            let diff = i128::from(mean) - i128::from(self.target_ns);
            i64::try_from(diff).unwrap_or(if diff > 0 { i64::MAX } else { i64::MIN })
        })
    }
}
