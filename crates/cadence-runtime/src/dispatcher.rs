//! Tick dispatcher.
//!
//! One call to [`TickDispatcher::tick`] is one tick:
//! 1. Invoke every subscriber, in subscription order
//! 2. Sample the clock
//! 3. Work out what is left of the current interval
//! 4. Wait for the boundary, or absorb an overrun
//! 5. Stop if the host is no longer active
//!
//! Subscriber work is charged against the interval: cadence is measured end
//! to end. After a wait the reference timestamp moves to the intended
//! boundary, not the actual wake time, so wake-up jitter does not accumulate.
//! After an overrun it moves to the observed time and the lost time is not
//! made up.

use crate::cadence::CadenceController;
use crate::clock::{SystemTimebase, Timebase};
use crate::host::Host;
use crate::subscribers::{SubscriptionToken, Subscribers};
use crate::wait::{HybridWait, WaitOutcome};
use cadence_common::config::CadenceConfig;
use cadence_common::error::{CadenceError, CadenceResult};
use cadence_common::metrics::TickMetrics;
use cadence_common::state::{DispatcherState, StateMachine};
use cadence_common::time::Timestamp;
use std::time::Duration;
use tracing::{info, trace, warn};

/// Result of a single tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Subscribers invoked.
    pub notified: usize,
    /// Time spent in subscribers.
    pub work_time: Duration,
    /// What the pacing wait did; `None` if the tick overran.
    pub wait: Option<WaitOutcome>,
    /// Whether the tick exceeded its interval.
    pub overrun: bool,
    /// Measured time since the previous tick completed (metrics only).
    pub interval: Option<Duration>,
    /// Dispatcher state after the tick.
    pub state: DispatcherState,
}

/// Paces a recurring tick and fans it out to subscribers.
///
/// Single-threaded by construction: the subscriber registry is
/// reference-counted without synchronization, so the dispatcher is `!Send`.
pub struct TickDispatcher<T: Timebase, H: Host> {
    timebase: T,
    host: H,
    state: StateMachine,
    cadence: CadenceController,
    wait: HybridWait,
    subscribers: Subscribers,
    /// Start of the current interval.
    last_tick: Timestamp,
    /// End of the previous tick, for interval metrics.
    last_completion: Option<Timestamp>,
    tick_count: u64,
    metrics: Option<TickMetrics>,
    suppress_native_pacing: bool,
    attached: bool,
}

impl<T: Timebase, H: Host> TickDispatcher<T, H> {
    /// Create an uninitialized dispatcher.
    pub fn new(timebase: T, host: H, config: &CadenceConfig) -> Self {
        let cadence = CadenceController::new(&timebase, config.target_rate);
        let metrics = config
            .metrics
            .enabled
            .then(|| TickMetrics::new(config.metrics.histogram_size, cadence.interval()));

        Self {
            timebase,
            host,
            state: StateMachine::new(),
            cadence,
            wait: HybridWait::new(config.spin_threshold),
            subscribers: Subscribers::new(),
            last_tick: Timestamp::ZERO,
            last_completion: None,
            tick_count: 0,
            metrics,
            suppress_native_pacing: config.suppress_native_pacing,
            attached: false,
        }
    }

    /// Start processing ticks.
    ///
    /// Transitions UNINITIALIZED → RUNNING. `rate` overrides the configured
    /// target rate. The current time becomes the start of the first interval.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidStateTransition`] if the dispatcher was
    /// already initialized or stopped.
    pub fn initialize(&mut self, rate: Option<f64>) -> CadenceResult<()> {
        self.state.transition(DispatcherState::Running)?;

        if let Some(rate) = rate {
            self.set_target(rate);
        }

        self.last_tick = self.timebase.now();
        self.last_completion = Some(self.last_tick);

        if self.suppress_native_pacing {
            self.host.suppress_native_pacing();
        }
        self.host.attach();
        self.attached = true;

        info!(
            rate = self.cadence.rate(),
            interval_us = self.cadence.interval().as_micros(),
            frequency_hz = self.cadence.frequency().hz(),
            spin_threshold_us = self.wait.spin_threshold().as_micros(),
            "Tick dispatcher running"
        );
        Ok(())
    }

    /// Run one tick: dispatch, then pace until the next interval boundary.
    ///
    /// A panicking subscriber unwinds through this call. The remaining
    /// subscribers, the wait and the reference update are skipped for that
    /// tick, and the dispatcher stays RUNNING.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::NotRunning`] outside the RUNNING state, in
    /// which case no subscriber is invoked.
    pub fn tick(&mut self) -> CadenceResult<TickReport> {
        let state = self.state.state();
        if !state.is_running() {
            return Err(CadenceError::NotRunning {
                state: state.to_string(),
            });
        }

        let dispatch_start = self.timebase.now();
        let notified = self.subscribers.dispatch();
        let now = self.timebase.now();

        let frequency = self.cadence.frequency();
        let elapsed = now.ticks_since(self.last_tick).max(0);
        let interval = i64::try_from(self.cadence.interval_ticks()).unwrap_or(i64::MAX);
        let remaining = interval - elapsed;

        let (wait, overrun) = if remaining > 0 {
            let boundary = now.add_ticks(remaining.unsigned_abs());
            let outcome = self.wait.wait_until(&self.timebase, boundary, frequency);
            self.last_tick = boundary;
            (Some(outcome), false)
        } else {
            warn!(
                tick = self.tick_count + 1,
                over_us = frequency.ticks_to_duration(remaining.unsigned_abs()).as_micros(),
                "Tick overran its interval"
            );
            self.last_tick = now;
            (None, true)
        };

        self.tick_count += 1;
        let measured = self.record_interval(overrun);
        let work_time = frequency.ticks_to_duration(now.ticks_since(dispatch_start).max(0).unsigned_abs());

        trace!(
            tick = self.tick_count,
            notified,
            work_us = work_time.as_micros(),
            sleeps = wait.map_or(0, |w| w.sleeps),
            spins = wait.map_or(0, |w| w.spins),
            "Tick complete"
        );

        if !self.host.is_active() {
            info!(tick = self.tick_count, "Host no longer active");
            self.stop();
        }

        Ok(TickReport {
            tick: self.tick_count,
            notified,
            work_time,
            wait,
            overrun,
            interval: measured,
            state: self.state.state(),
        })
    }

    fn record_interval(&mut self, overrun: bool) -> Option<Duration> {
        let metrics = self.metrics.as_mut()?;
        let completed = self.timebase.now();
        let interval = self.last_completion.map(|previous| {
            self.cadence
                .frequency()
                .ticks_to_duration(completed.ticks_since(previous).max(0).unsigned_abs())
        });
        self.last_completion = Some(completed);

        if let Some(interval) = interval {
            metrics.record(interval, overrun);
        }
        interval
    }

    /// Tick until the dispatcher stops, returning the number of ticks run.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::NotRunning`] if called before `initialize`.
    pub fn run(&mut self) -> CadenceResult<u64> {
        let state = self.state.state();
        if !state.is_running() {
            return Err(CadenceError::NotRunning {
                state: state.to_string(),
            });
        }

        let start = self.tick_count;
        while self.state.state().is_running() {
            self.tick()?;
        }
        Ok(self.tick_count - start)
    }

    /// Tear down: clear subscribers and detach from the host.
    ///
    /// Idempotent. Legal before `initialize`, after which the dispatcher
    /// can no longer be started.
    pub fn stop(&mut self) {
        if self.state.state().is_stopped() {
            return;
        }

        self.subscribers.clear();
        if self.attached {
            self.host.detach();
            self.attached = false;
        }

        if let Err(e) = self.state.transition(DispatcherState::Stopped) {
            warn!("Stop transition rejected: {e}");
            return;
        }
        info!(ticks = self.tick_count, "Tick dispatcher stopped");
    }

    /// Change the target rate; applies from the next tick. Legal in any state.
    ///
    /// Non-positive rates fall back to 60 with a warning.
    pub fn set_target(&mut self, rate: f64) {
        self.cadence.set_target(rate, &self.timebase);
        if let Some(metrics) = self.metrics.as_mut() {
            metrics.retarget(self.cadence.interval());
        }
    }

    /// Add a subscriber. Legal in any state.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: FnMut() + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Remove a subscriber. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.subscribers.unsubscribe(token)
    }

    /// Handle onto the subscriber registry, for use inside callbacks.
    #[must_use]
    pub fn subscribers(&self) -> Subscribers {
        self.subscribers.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DispatcherState {
        self.state.state()
    }

    /// Ticks completed.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Start of the current interval.
    #[must_use]
    pub fn last_tick(&self) -> Timestamp {
        self.last_tick
    }

    /// Rate and interval bookkeeping.
    #[must_use]
    pub fn cadence(&self) -> &CadenceController {
        &self.cadence
    }

    /// Wait strategy in use.
    #[must_use]
    pub fn wait_strategy(&self) -> &HybridWait {
        &self.wait
    }

    /// Interval metrics, if enabled.
    #[must_use]
    pub fn metrics(&self) -> Option<&TickMetrics> {
        self.metrics.as_ref()
    }

    /// The timebase being paced against.
    #[must_use]
    pub fn timebase(&self) -> &T {
        &self.timebase
    }

    /// The driving host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the driving host.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: Host> TickDispatcher<SystemTimebase, H> {
    /// Create a dispatcher on the operating system clock.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Config`] if `config` fails validation and
    /// [`CadenceError::Unsupported`] if the configured sleep backend is not
    /// available here.
    pub fn with_system_clock(host: H, config: &CadenceConfig) -> CadenceResult<Self> {
        config
            .validate()
            .map_err(|e| CadenceError::Config(e.to_string()))?;
        let timebase = SystemTimebase::new(config.sleep_backend)?;
        Ok(Self::new(timebase, host, config))
    }
}

/// Builder for configuring a dispatcher.
pub struct TickDispatcherBuilder<T: Timebase, H: Host> {
    timebase: T,
    host: H,
    config: CadenceConfig,
}

impl<T: Timebase, H: Host> TickDispatcherBuilder<T, H> {
    /// Start from the default configuration.
    pub fn new(timebase: T, host: H) -> Self {
        Self {
            timebase,
            host,
            config: CadenceConfig::default(),
        }
    }

    /// Set the target rate.
    #[must_use]
    pub fn target_rate(mut self, rate: f64) -> Self {
        self.config.target_rate = rate;
        self
    }

    /// Set the spin threshold.
    #[must_use]
    pub fn spin_threshold(mut self, threshold: Duration) -> Self {
        self.config.spin_threshold = threshold;
        self
    }

    /// Enable or disable interval metrics.
    #[must_use]
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.config.metrics.enabled = enabled;
        self
    }

    /// Whether to ask the host to disable its own pacing.
    #[must_use]
    pub fn suppress_native_pacing(mut self, suppress: bool) -> Self {
        self.config.suppress_native_pacing = suppress;
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: CadenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the dispatcher.
    pub fn build(self) -> TickDispatcher<T, H> {
        TickDispatcher::new(self.timebase, self.host, &self.config)
    }
}
