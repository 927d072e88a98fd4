use thiserror::Error;

/// Cadence scheduler errors covering lifecycle misuse and platform support.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CadenceError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A platform primitive required by the configuration is not available.
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    /// An operation that requires the running state was attempted outside it.
    #[error("dispatcher is not running (state: {state})")]
    NotRunning {
        /// State the dispatcher was in.
        state: String,
    },

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

/// Convenience type alias for cadence operations.
pub type CadenceResult<T> = Result<T, CadenceError>;
