#![doc = "Cadence scheduler core: paces a recurring tick against a monotonic clock."]

pub mod cadence;
pub mod clock;
pub mod dispatcher;
pub mod host;
pub mod subscribers;
pub mod wait;

pub use cadence::*;
pub use clock::*;
pub use dispatcher::*;
pub use host::*;
pub use subscribers::*;
pub use wait::*;
