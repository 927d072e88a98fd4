//! Target rate bookkeeping.
//!
//! The controller turns a requested rate into a whole number of clock ticks
//! per interval. Invalid rates never fail: they are replaced by
//! [`DEFAULT_TARGET_RATE`] and a warning is logged.

use crate::clock::MonotonicClock;
use cadence_common::config::DEFAULT_TARGET_RATE;
use cadence_common::time::ClockFrequency;
use std::time::Duration;
use tracing::{debug, warn};

/// Owns the target rate and the tick interval derived from it.
#[derive(Debug, Clone)]
pub struct CadenceController {
    rate: f64,
    frequency: ClockFrequency,
    interval_ticks: u64,
    coerced: u64,
}

impl CadenceController {
    /// Create a controller for `clock` aiming at `rate` ticks per second.
    pub fn new<C: MonotonicClock + ?Sized>(clock: &C, rate: f64) -> Self {
        let mut controller = Self {
            rate: DEFAULT_TARGET_RATE,
            frequency: clock.frequency(),
            interval_ticks: 0,
            coerced: 0,
        };
        controller.set_target(rate, clock);
        controller
    }

    /// Change the target rate.
    ///
    /// Re-reads the clock frequency and recomputes the interval. The new
    /// interval applies to the very next tick. A rate that is not strictly
    /// positive (including NaN) is replaced by 60.
    pub fn set_target<C: MonotonicClock + ?Sized>(&mut self, rate: f64, clock: &C) {
        let effective = if rate > 0.0 {
            rate
        } else {
            self.coerced += 1;
            warn!(
                requested = rate,
                fallback = DEFAULT_TARGET_RATE,
                "Target rate must be positive, using fallback"
            );
            DEFAULT_TARGET_RATE
        };

        self.rate = effective;
        self.frequency = clock.frequency();
        self.interval_ticks = interval_ticks(self.frequency, effective);

        debug!(
            rate = effective,
            frequency_hz = self.frequency.hz(),
            interval_ticks = self.interval_ticks,
            "Cadence target set"
        );
    }

    /// Effective rate in ticks per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Clock frequency the interval was computed against.
    #[must_use]
    pub fn frequency(&self) -> ClockFrequency {
        self.frequency
    }

    /// Interval length in clock ticks.
    #[must_use]
    pub fn interval_ticks(&self) -> u64 {
        self.interval_ticks
    }

    /// Interval length as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.frequency.ticks_to_duration(self.interval_ticks)
    }

    /// How many requested rates have been replaced by the fallback.
    #[must_use]
    pub fn coerced_count(&self) -> u64 {
        self.coerced
    }
}

/// `floor(frequency / rate)`, saturating at the `u64` range.
///
/// An infinite rate yields zero, which makes every tick an overrun.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn interval_ticks(frequency: ClockFrequency, rate: f64) -> u64 {
    // `as` saturates on out-of-range floats
    (frequency.hz() as f64 / rate).floor() as u64
}
