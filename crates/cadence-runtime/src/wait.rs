//! Hybrid sleep/spin wait.
//!
//! OS sleeps are cheap but coarse: depending on the platform they overshoot
//! by anything from tens of microseconds to a few milliseconds. Spinning is
//! exact but burns a core. [`HybridWait`] sleeps through all but the last
//! `spin_threshold` of a wait, re-reads the clock after every sleep, and
//! spins only through that final slice.
//!
//! Termination: every sleep requests strictly less than the measured
//! remainder, and the spin exits as soon as the monotonic clock reaches the
//! target.

use crate::clock::Timebase;
use cadence_common::config::DEFAULT_SPIN_THRESHOLD;
use cadence_common::time::{ClockFrequency, Timestamp};
use std::time::Duration;

/// What a single wait did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Coarse sleeps issued.
    pub sleeps: u32,
    /// Spin iterations executed.
    pub spins: u64,
    /// Clock ticks past the target at the final clock read.
    pub overshoot_ticks: u64,
}

/// Sleep-then-spin wait strategy.
#[derive(Debug, Clone, Copy)]
pub struct HybridWait {
    spin_threshold_ns: u64,
}

impl Default for HybridWait {
    fn default() -> Self {
        Self::new(DEFAULT_SPIN_THRESHOLD)
    }
}

impl HybridWait {
    /// Create a wait that spins through the final `spin_threshold`.
    #[must_use]
    pub fn new(spin_threshold: Duration) -> Self {
        Self {
            spin_threshold_ns: u64::try_from(spin_threshold.as_nanos()).unwrap_or(u64::MAX),
        }
    }

    /// Final slice of each wait that is spun.
    #[must_use]
    pub fn spin_threshold(&self) -> Duration {
        Duration::from_nanos(self.spin_threshold_ns)
    }

    /// Block until `timebase` reads at least `target`.
    ///
    /// `frequency` converts the remaining ticks into a sleep request. A
    /// target already in the past returns immediately.
    pub fn wait_until<T: Timebase + ?Sized>(
        &self,
        timebase: &T,
        target: Timestamp,
        frequency: ClockFrequency,
    ) -> WaitOutcome {
        let mut outcome = WaitOutcome::default();

        loop {
            let now = timebase.now();
            let remaining = target.ticks_since(now);
            if remaining <= 0 {
                outcome.overshoot_ticks = remaining.unsigned_abs();
                return outcome;
            }

            let remaining_ns = frequency.ticks_to_nanos(remaining.unsigned_abs());
            if remaining_ns > self.spin_threshold_ns {
                timebase.sleep_approx(remaining_ns - self.spin_threshold_ns);
                outcome.sleeps += 1;
                continue;
            }

            loop {
                std::hint::spin_loop();
                outcome.spins += 1;
                let now = timebase.now();
                if now >= target {
                    outcome.overshoot_ticks = now.ticks_since(target).unsigned_abs();
                    return outcome;
                }
            }
        }
    }
}
