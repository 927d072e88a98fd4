//! Monotonic clock and coarse sleep capabilities.
//!
//! The pacing algorithm only ever talks to a [`Timebase`]: a monotonic
//! counter with a fixed frequency plus a best-effort relative sleep. Platform
//! selection happens once, inside [`SystemTimebase`]; [`SimulatedTimebase`]
//! replaces both primitives with a deterministic timeline for tests.

use cadence_common::config::SleepBackend;
use cadence_common::error::{CadenceError, CadenceResult};
use cadence_common::time::{ClockFrequency, Timestamp};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// A monotonic, non-decreasing counter.
pub trait MonotonicClock {
    /// Current counter value.
    fn now(&self) -> Timestamp;

    /// Counter ticks per second, constant for the life of the clock.
    fn frequency(&self) -> ClockFrequency;
}

/// A relative sleep of roughly the requested length.
///
/// Implementations may overshoot by their platform's timer granularity.
/// Callers must re-read the clock afterwards instead of trusting the duration.
pub trait CoarseSleep {
    /// Sleep for approximately `duration_ns` nanoseconds.
    fn sleep_approx(&self, duration_ns: u64);
}

/// Clock and sleep pair the scheduler paces against.
pub trait Timebase: MonotonicClock + CoarseSleep {}

impl<T: MonotonicClock + CoarseSleep + ?Sized> Timebase for T {}

/// Timebase backed by the operating system.
///
/// On Linux the counter is `CLOCK_MONOTONIC` read through `clock_gettime`;
/// elsewhere it is [`std::time::Instant`] measured from construction. Both
/// count nanoseconds.
#[derive(Debug)]
pub struct SystemTimebase {
    backend: SleepBackend,
    #[cfg(not(target_os = "linux"))]
    anchor: std::time::Instant,
}

impl SystemTimebase {
    /// Create a timebase using the given sleep primitive.
    ///
    /// `SleepBackend::Auto` resolves to `Nanosleep` on Linux and `Thread`
    /// elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Unsupported`] if the monotonic clock cannot be
    /// read or the requested sleep primitive does not exist on this platform.
    pub fn new(backend: SleepBackend) -> CadenceResult<Self> {
        let backend = resolve_backend(backend)?;

        #[cfg(target_os = "linux")]
        {
            nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC).map_err(|e| {
                CadenceError::Unsupported(format!("CLOCK_MONOTONIC unavailable: {e}"))
            })?;
        }

        debug!(?backend, "System timebase ready");

        Ok(Self {
            backend,
            #[cfg(not(target_os = "linux"))]
            anchor: std::time::Instant::now(),
        })
    }

    /// Sleep primitive in use.
    #[must_use]
    pub fn backend(&self) -> SleepBackend {
        self.backend
    }
}

#[cfg(target_os = "linux")]
fn resolve_backend(backend: SleepBackend) -> CadenceResult<SleepBackend> {
    Ok(match backend {
        SleepBackend::Auto => SleepBackend::Nanosleep,
        other => other,
    })
}

#[cfg(not(target_os = "linux"))]
fn resolve_backend(backend: SleepBackend) -> CadenceResult<SleepBackend> {
    match backend {
        SleepBackend::Auto | SleepBackend::Thread => Ok(SleepBackend::Thread),
        SleepBackend::Nanosleep => Err(CadenceError::Unsupported(
            "clock_nanosleep sleep backend requires Linux".into(),
        )),
    }
}

impl MonotonicClock for SystemTimebase {
    #[cfg(target_os = "linux")]
    fn now(&self) -> Timestamp {
        use cadence_common::time::NANOS_PER_SEC;

        // Readability was checked in `new`; CLOCK_MONOTONIC cannot vanish later.
        let ts = nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC)
            .unwrap_or_else(|e| panic!("CLOCK_MONOTONIC read failed: {e}"));
        let secs = u64::try_from(ts.tv_sec()).unwrap_or(0);
        let nanos = u64::try_from(ts.tv_nsec()).unwrap_or(0);
        Timestamp(secs.saturating_mul(NANOS_PER_SEC).saturating_add(nanos))
    }

    #[cfg(not(target_os = "linux"))]
    fn now(&self) -> Timestamp {
        Timestamp(u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX))
    }

    fn frequency(&self) -> ClockFrequency {
        ClockFrequency::NANOSECONDS
    }
}

impl CoarseSleep for SystemTimebase {
    fn sleep_approx(&self, duration_ns: u64) {
        match self.backend {
            #[cfg(target_os = "linux")]
            SleepBackend::Nanosleep => nanosleep_relative(duration_ns),
            _ => std::thread::sleep(Duration::from_nanos(duration_ns)),
        }
    }
}

/// Relative `clock_nanosleep` on `CLOCK_MONOTONIC`.
///
/// An interrupted sleep simply returns early.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn nanosleep_relative(duration_ns: u64) {
    use cadence_common::time::NANOS_PER_SEC;

    let ts = libc::timespec {
        tv_sec: libc::time_t::try_from(duration_ns / NANOS_PER_SEC).unwrap_or(libc::time_t::MAX),
        #[allow(clippy::cast_possible_wrap)]
        tv_nsec: (duration_ns % NANOS_PER_SEC) as libc::c_long,
    };

    // SAFETY: `ts` is a valid timespec and the remainder pointer may be null.
    unsafe {
        libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &ts, std::ptr::null_mut());
    }
}

/// Deterministic timebase for tests and dry runs.
///
/// Time only moves when the clock is sampled, when something sleeps on it,
/// or when [`SimulatedTimebase::advance`] is called. Every sample costs
/// `sample_cost` ticks (at least one) so that a spin loop always makes
/// progress. Clones share one timeline, which lets a subscriber closure hold
/// a handle and burn simulated time.
#[derive(Debug, Clone)]
pub struct SimulatedTimebase {
    inner: Rc<SimInner>,
}

#[derive(Debug)]
struct SimInner {
    frequency: ClockFrequency,
    now: Cell<u64>,
    sample_cost: Cell<u64>,
    sleep_overshoot: Cell<Duration>,
    samples: Cell<u64>,
    sleeps: RefCell<Vec<u64>>,
}

impl SimulatedTimebase {
    /// Create a timeline at tick zero counting at `frequency`.
    #[must_use]
    pub fn new(frequency: ClockFrequency) -> Self {
        Self {
            inner: Rc::new(SimInner {
                frequency,
                now: Cell::new(0),
                sample_cost: Cell::new(1),
                sleep_overshoot: Cell::new(Duration::ZERO),
                samples: Cell::new(0),
                sleeps: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Ticks each clock read advances the timeline by (minimum one).
    #[must_use]
    pub fn with_sample_cost(self, ticks: u64) -> Self {
        self.inner.sample_cost.set(ticks.max(1));
        self
    }

    /// Extra time every sleep takes beyond what was requested.
    #[must_use]
    pub fn with_sleep_overshoot(self, overshoot: Duration) -> Self {
        self.inner.sleep_overshoot.set(overshoot);
        self
    }

    /// Move the timeline forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        let now = &self.inner.now;
        now.set(now.get().saturating_add(ticks));
    }

    /// Move the timeline forward by a wall-clock duration.
    pub fn advance_by(&self, duration: Duration) {
        self.advance(self.inner.frequency.duration_to_ticks(duration));
    }

    /// Current position without charging a sample.
    #[must_use]
    pub fn peek(&self) -> Timestamp {
        Timestamp(self.inner.now.get())
    }

    /// Number of clock reads so far.
    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.inner.samples.get()
    }

    /// Requested duration, in nanoseconds, of every sleep so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<u64> {
        self.inner.sleeps.borrow().clone()
    }
}

impl MonotonicClock for SimulatedTimebase {
    fn now(&self) -> Timestamp {
        let inner = &self.inner;
        let current = inner.now.get();
        inner.now.set(current.saturating_add(inner.sample_cost.get()));
        inner.samples.set(inner.samples.get() + 1);
        Timestamp(current)
    }

    fn frequency(&self) -> ClockFrequency {
        self.inner.frequency
    }
}

impl CoarseSleep for SimulatedTimebase {
    fn sleep_approx(&self, duration_ns: u64) {
        self.inner.sleeps.borrow_mut().push(duration_ns);
        let overshoot = self.inner.sleep_overshoot.get();
        let slept = Duration::from_nanos(duration_ns).saturating_add(overshoot);
        self.advance_by(slept);
    }
}
