//! Dispatcher lifecycle state machine.
//!
//! UNINITIALIZED → RUNNING → STOPPED
//!
//! STOPPED is terminal. A dispatcher that was never initialized may still be
//! stopped directly, which is how a host tears it down after a failed start.

use crate::error::{CadenceError, CadenceResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a tick dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatcherState {
    /// Constructed; not attached to a driver, no ticks processed.
    #[default]
    Uninitialized,
    /// Attached to the driver and processing ticks.
    Running,
    /// Subscribers cleared and driver detached.
    Stopped,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl DispatcherState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: DispatcherState) -> bool {
        use DispatcherState::{Running, Stopped, Uninitialized};

        matches!(
            (self, target),
            (Uninitialized, Running) | (Uninitialized, Stopped) | (Running, Stopped)
        )
    }

    /// Returns true while ticks are being processed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true once the dispatcher has been torn down.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// State machine wrapper with transition history tracking.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: DispatcherState,
    previous: Option<DispatcherState>,
    transition_count: u64,
}

impl StateMachine {
    /// Create a new state machine starting in UNINITIALIZED.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> DispatcherState {
        self.current
    }

    /// Get the previous state (if any transition occurred).
    #[must_use]
    pub fn previous_state(&self) -> Option<DispatcherState> {
        self.previous
    }

    /// Get total number of transitions.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidStateTransition`] if `target` is not
    /// reachable from the current state. The state is left unchanged.
    pub fn transition(&mut self, target: DispatcherState) -> CadenceResult<()> {
        if self.current.can_transition_to(target) {
            self.previous = Some(self.current);
            self.current = target;
            self.transition_count += 1;
            Ok(())
        } else {
            Err(CadenceError::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            })
        }
    }
}
