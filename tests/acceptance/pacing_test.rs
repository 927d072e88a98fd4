//! Pacing acceptance tests on the real clock.
//!
//! # Acceptance Criteria
//!
//! - Mean interval within 2% of the target over many ticks
//! - `wait_until` never returns before its target
//! - An overrun is followed by a full interval, not a burst

use super::common::{relative_error, system_dispatcher, TickTimes};
use cadence_common::config::SleepBackend;
use cadence_runtime::clock::{MonotonicClock, SystemTimebase};
use cadence_runtime::wait::HybridWait;
use std::time::{Duration, Instant};

/// 100 ticks at 100 Hz average 10 ms apart.
#[test]
fn test_mean_interval_at_100hz() {
    let mut dispatcher = system_dispatcher(100.0, 100);
    let times = TickTimes::default();
    times.attach(&dispatcher);

    dispatcher.initialize(None).unwrap();
    let ran = dispatcher.run().unwrap();

    assert_eq!(ran, 100);
    assert_eq!(times.len(), 100);

    let mean = times.mean_interval();
    let error = relative_error(mean, Duration::from_millis(10));
    println!("mean interval {mean:?}, error {:.3}%", error * 100.0);
    assert!(error < 0.02, "mean interval {mean:?} is more than 2% off 10ms");
}

/// The boundary reference advances by exactly one interval per tick.
#[test]
fn test_no_drift_over_run() {
    let mut dispatcher = system_dispatcher(100.0, 50);
    dispatcher.initialize(None).unwrap();
    let start = dispatcher.last_tick();
    let interval = dispatcher.cadence().interval_ticks();

    dispatcher.run().unwrap();

    let advanced = dispatcher.last_tick().ticks_since(start);
    assert_eq!(advanced, i64::try_from(50 * interval).unwrap());
}

/// Longer run with metrics, reporting jitter.
#[test]
#[ignore = "Runs for 10 seconds"]
fn test_sustained_60hz() {
    let mut dispatcher = system_dispatcher(60.0, 600);
    dispatcher.initialize(None).unwrap();
    dispatcher.run().unwrap();

    let metrics = dispatcher.metrics().expect("metrics enabled by default");
    let snap = metrics.snapshot();
    println!("Results (60 Hz, 600 ticks):");
    println!("  Mean: {:?} ns", snap.mean_ns);
    println!("  Min: {:?} ns", snap.min_ns);
    println!("  Max: {:?} ns", snap.max_ns);
    println!("  Overruns: {}", snap.overrun_count);

    let mean = Duration::from_nanos(snap.mean_ns.unwrap());
    assert!(relative_error(mean, dispatcher.cadence().interval()) < 0.01);
    assert_eq!(snap.overrun_count, 0);
}

#[test]
fn test_wait_until_never_early() {
    for backend in [SleepBackend::Auto, SleepBackend::Thread] {
        let clock = SystemTimebase::new(backend).unwrap();
        let wait = HybridWait::default();
        let frequency = clock.frequency();

        for delay_us in [0u64, 20, 400, 3_000] {
            let target = clock
                .now()
                .add_ticks(frequency.duration_to_ticks(Duration::from_micros(delay_us)));
            let outcome = wait.wait_until(&clock, target, frequency);

            assert!(clock.now() >= target, "{backend:?} woke early for {delay_us}us");
            let late = frequency.ticks_to_duration(outcome.overshoot_ticks);
            assert!(late < Duration::from_millis(5), "{backend:?} overshot by {late:?}");
        }
    }
}

/// A slow tick is followed by one normal interval, not back-to-back ticks.
#[test]
fn test_overrun_does_not_catch_up() {
    let mut dispatcher = system_dispatcher(100.0, 6);
    let times = TickTimes::default();
    times.attach(&dispatcher);

    let mut calls = 0u32;
    dispatcher.subscribe(move || {
        calls += 1;
        if calls == 2 {
            std::thread::sleep(Duration::from_millis(35));
        }
    });

    dispatcher.initialize(None).unwrap();
    let mut overruns = 0;
    while dispatcher.state().is_running() {
        if dispatcher.tick().unwrap().overrun {
            overruns += 1;
        }
    }
    assert_eq!(overruns, 1);

    // The slow tick stretches one gap; none of the later gaps shrink.
    let intervals = times.intervals();
    assert!(intervals[1] >= Duration::from_millis(35));
    for gap in &intervals[2..] {
        assert!(
            *gap >= Duration::from_millis(9),
            "catch-up burst detected: {intervals:?}"
        );
    }
}

/// Spinning only near the boundary keeps the loop from burning a full core.
#[test]
fn test_sleep_dominates_wait() {
    let mut dispatcher = system_dispatcher(50.0, 10);
    dispatcher.initialize(None).unwrap();

    let mut sleeps = 0;
    let started = Instant::now();
    while dispatcher.state().is_running() {
        if let Some(wait) = dispatcher.tick().unwrap().wait {
            sleeps += wait.sleeps;
        }
    }

    assert!(sleeps >= 10, "expected at least one sleep per tick, got {sleeps}");
    assert!(started.elapsed() >= Duration::from_millis(190));
}
