//! Contract between the dispatcher and the loop that drives it.
//!
//! The host owns the update loop and calls `tick` once per cycle. The
//! dispatcher calls back into the host to take over pacing on start, to
//! learn when the host is winding down, and to detach on stop.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Host-side hooks used by the dispatcher.
pub trait Host {
    /// Disable any display-synchronized pacing the host applies on its own,
    /// so that the dispatcher is the only thing setting the cadence.
    fn suppress_native_pacing(&mut self) {}

    /// Register the dispatcher's tick handler with the driver.
    fn attach(&mut self) {}

    /// Remove the dispatcher's tick handler from the driver.
    fn detach(&mut self) {}

    /// Whether the host is still in its active/running state.
    ///
    /// Checked at the end of every tick; returning false stops the dispatcher.
    fn is_active(&self) -> bool;
}

/// Host for headless use: active until told otherwise or until a tick
/// budget runs out.
///
/// The stop flag is an `Arc<AtomicBool>` so that a signal handler or another
/// thread can request shutdown. Everything else is plain single-threaded
/// state.
#[derive(Debug)]
pub struct StandaloneHost {
    running: Arc<AtomicBool>,
    max_ticks: Option<u64>,
    polls: Cell<u64>,
    attached: bool,
    pacing_suppressed: bool,
}

impl Default for StandaloneHost {
    fn default() -> Self {
        Self::new()
    }
}

impl StandaloneHost {
    /// Create a host that stays active until [`StandaloneHost::request_stop`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            max_ticks: None,
            polls: Cell::new(0),
            attached: false,
            pacing_suppressed: false,
        }
    }

    /// Become inactive after `ticks` ticks. Zero means no limit.
    #[must_use]
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = (ticks > 0).then_some(ticks);
        self
    }

    /// Flag that keeps the host active; store `false` to request a stop.
    #[must_use]
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Request that the dispatcher stop at the end of its current tick.
    pub fn request_stop(&self) {
        info!("Stop requested");
        self.running.store(false, Ordering::Relaxed);
    }

    /// Whether the dispatcher is currently attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Whether the dispatcher asked for native pacing to be disabled.
    #[must_use]
    pub fn native_pacing_suppressed(&self) -> bool {
        self.pacing_suppressed
    }
}

impl Host for StandaloneHost {
    fn suppress_native_pacing(&mut self) {
        // Nothing to disable without a display; remembered for inspection
        self.pacing_suppressed = true;
    }

    fn attach(&mut self) {
        debug!("Dispatcher attached to standalone host");
        self.attached = true;
    }

    fn detach(&mut self) {
        debug!("Dispatcher detached from standalone host");
        self.attached = false;
    }

    fn is_active(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);

        if self.max_ticks.is_some_and(|max| polls >= max) && self.running.swap(false, Ordering::Relaxed) {
            info!(ticks = polls, "Tick budget exhausted");
        }
        self.running.load(Ordering::Relaxed)
    }
}
