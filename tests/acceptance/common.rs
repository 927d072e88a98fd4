//! Common utilities for integration tests.

use cadence_common::config::CadenceConfig;
use cadence_runtime::clock::SystemTimebase;
use cadence_runtime::dispatcher::TickDispatcher;
use cadence_runtime::host::StandaloneHost;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub type SystemDispatcher = TickDispatcher<SystemTimebase, StandaloneHost>;

/// Dispatcher on the system clock at `rate`, stopping after `max_ticks`.
pub fn system_dispatcher(rate: f64, max_ticks: u64) -> SystemDispatcher {
    let config = CadenceConfig {
        target_rate: rate,
        ..CadenceConfig::default()
    };
    let host = StandaloneHost::new().with_max_ticks(max_ticks);
    TickDispatcher::with_system_clock(host, &config).expect("system clock available")
}

/// Records the wall-clock instant of every notification.
#[derive(Clone, Default)]
pub struct TickTimes(Rc<RefCell<Vec<Instant>>>);

impl TickTimes {
    pub fn attach(&self, dispatcher: &SystemDispatcher) {
        let times = Rc::clone(&self.0);
        dispatcher.subscribe(move || times.borrow_mut().push(Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Gaps between consecutive notifications.
    pub fn intervals(&self) -> Vec<Duration> {
        self.0
            .borrow()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    /// Mean gap between the first and last notification.
    pub fn mean_interval(&self) -> Duration {
        let times = self.0.borrow();
        let gaps = u32::try_from(times.len() - 1).expect("gap count fits in u32");
        (times[times.len() - 1] - times[0]) / gaps
    }
}

/// Relative error of `actual` against `expected`.
pub fn relative_error(actual: Duration, expected: Duration) -> f64 {
    (actual.as_secs_f64() - expected.as_secs_f64()).abs() / expected.as_secs_f64()
}
