//! Signal handling for the daemon.
//!
//! SIGTERM and SIGINT request shutdown; SIGHUP requests a configuration
//! reload. The handlers only store into static atomics. The tick loop reads
//! them between ticks, so a signal takes effect at the next tick boundary.

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::cell::Cell;
use std::ffi::c_int;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static RELOAD: AtomicBool = AtomicBool::new(false);
static RECEIVED: AtomicU32 = AtomicU32::new(0);

extern "C" fn on_signal(signum: c_int) {
    if signum == Signal::SIGHUP as c_int {
        RELOAD.store(true, Ordering::SeqCst);
    } else {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }
    RECEIVED.fetch_add(1, Ordering::SeqCst);
}

/// Shutdown and reload requests for the tick loop.
///
/// Signal-driven requests live in process-wide flags shared by every installed
/// handle; a detached handle ignores them.
#[derive(Debug)]
pub struct SignalHandler {
    installed: bool,
    stop_requested: Cell<bool>,
}

impl SignalHandler {
    /// Install handlers for SIGTERM, SIGINT and SIGHUP.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a handler cannot be installed.
    #[allow(unsafe_code)]
    pub fn install() -> nix::Result<Self> {
        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        for sig in [Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP] {
            // SAFETY: `on_signal` only touches atomics, which is
            // async-signal-safe.
            unsafe { signal::sigaction(sig, &action) }?;
        }

        debug!("Signal handlers installed for SIGTERM, SIGINT, SIGHUP");
        Ok(Self {
            installed: true,
            stop_requested: Cell::new(false),
        })
    }

    /// A handle that ignores process signals.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            installed: false,
            stop_requested: Cell::new(false),
        }
    }

    /// Whether shutdown has been requested, by signal or by hand.
    pub fn shutdown_requested(&self) -> bool {
        self.stop_requested.get() || (self.installed && SHUTDOWN.load(Ordering::SeqCst))
    }

    /// Whether SIGHUP arrived since the last call, clearing the request.
    pub fn take_reload_request(&self) -> bool {
        self.installed && RELOAD.swap(false, Ordering::SeqCst)
    }

    /// Request shutdown without a signal.
    #[cfg(test)]
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        self.stop_requested.set(true);
    }

    /// Signals received since the handlers were installed.
    pub fn signal_count(&self) -> u32 {
        if self.installed {
            RECEIVED.load(Ordering::SeqCst)
        } else {
            0
        }
    }
}
