//! Integration tests for cadence acceptance testing.

mod common;
mod lifecycle_test;
mod pacing_test;
