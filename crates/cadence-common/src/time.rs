//! Monotonic timestamps and clock frequencies.
//!
//! A [`Timestamp`] is a raw counter value and only carries meaning together
//! with the [`ClockFrequency`] of the clock that produced it. Conversions
//! go through `u128` so that nanosecond-resolution clocks running for
//! months do not overflow intermediate products.

use std::fmt;
use std::num::NonZeroU64;
use std::time::Duration;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Raw reading of a monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Counter origin.
    pub const ZERO: Self = Self(0);

    /// Raw counter value.
    #[must_use]
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// Signed distance `self - earlier`, in clock ticks.
    ///
    /// Saturates at the `i64` range instead of wrapping.
    #[must_use]
    pub fn ticks_since(self, earlier: Timestamp) -> i64 {
        let diff = i128::from(self.0) - i128::from(earlier.0);
        i64::try_from(diff).unwrap_or(if diff > 0 { i64::MAX } else { i64::MIN })
    }

    /// Timestamp `ticks` later than `self`.
    #[must_use]
    pub fn add_ticks(self, ticks: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(ticks))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Ticks per second of a monotonic clock. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockFrequency(NonZeroU64);

impl ClockFrequency {
    /// A clock counting nanoseconds.
    pub const NANOSECONDS: Self = match NonZeroU64::new(NANOS_PER_SEC) {
        Some(hz) => Self(hz),
        None => panic!("nanosecond frequency is non-zero"),
    };

    /// Create a frequency, returning `None` for zero.
    #[must_use]
    pub fn new(hz: u64) -> Option<Self> {
        NonZeroU64::new(hz).map(Self)
    }

    /// Ticks per second.
    #[must_use]
    pub fn hz(self) -> u64 {
        self.0.get()
    }

    /// Convert a tick count to nanoseconds, rounding down.
    #[must_use]
    pub fn ticks_to_nanos(self, ticks: u64) -> u64 {
        let ns = u128::from(ticks) * u128::from(NANOS_PER_SEC) / u128::from(self.hz());
        u64::try_from(ns).unwrap_or(u64::MAX)
    }

    /// Convert nanoseconds to a tick count, rounding down.
    #[must_use]
    pub fn nanos_to_ticks(self, nanos: u64) -> u64 {
        let ticks = u128::from(nanos) * u128::from(self.hz()) / u128::from(NANOS_PER_SEC);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Convert a tick count to a [`Duration`].
    #[must_use]
    pub fn ticks_to_duration(self, ticks: u64) -> Duration {
        Duration::from_nanos(self.ticks_to_nanos(ticks))
    }

    /// Convert a [`Duration`] to a tick count, rounding down.
    #[must_use]
    pub fn duration_to_ticks(self, duration: Duration) -> u64 {
        self.nanos_to_ticks(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for ClockFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}
