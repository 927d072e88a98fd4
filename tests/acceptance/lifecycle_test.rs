//! Lifecycle and configuration acceptance tests.

use super::common::{system_dispatcher, TickTimes};
use cadence_common::config::CadenceConfig;
use cadence_common::error::CadenceError;
use cadence_common::state::DispatcherState;
use cadence_runtime::dispatcher::TickDispatcher;
use cadence_runtime::host::StandaloneHost;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_stop_is_idempotent_and_final() {
    let mut dispatcher = system_dispatcher(500.0, 0);
    let times = TickTimes::default();
    times.attach(&dispatcher);

    dispatcher.initialize(None).unwrap();
    dispatcher.tick().unwrap();
    dispatcher.stop();
    dispatcher.stop();

    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    assert!(!dispatcher.host().is_attached());
    assert!(dispatcher.subscribers().is_empty());
    assert!(matches!(
        dispatcher.tick(),
        Err(CadenceError::NotRunning { .. })
    ));
    assert!(dispatcher.initialize(None).is_err());
    assert_eq!(times.len(), 1);
}

/// An external stop request ends `run` at the next tick boundary.
#[test]
fn test_external_stop_flag() {
    let mut dispatcher = system_dispatcher(1000.0, 0);
    let flag = dispatcher.host().running_flag();

    let mut seen = 0u32;
    dispatcher.subscribe(move || {
        seen += 1;
        if seen == 5 {
            flag.store(false, std::sync::atomic::Ordering::SeqCst);
        }
    });

    dispatcher.initialize(None).unwrap();
    assert_eq!(dispatcher.run().unwrap(), 5);
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
}

#[test]
fn test_config_file_drives_dispatcher() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
target_rate = 250.0
spin_threshold = "100us"
sleep_backend = "thread"

[metrics]
enabled = true
histogram_size = 64
"#
    )
    .unwrap();

    let config = CadenceConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();

    let host = StandaloneHost::new().with_max_ticks(10);
    let mut dispatcher = TickDispatcher::with_system_clock(host, &config).unwrap();
    assert_eq!(dispatcher.cadence().interval(), Duration::from_millis(4));
    assert_eq!(dispatcher.wait_strategy().spin_threshold(), Duration::from_micros(100));

    dispatcher.initialize(None).unwrap();
    assert_eq!(dispatcher.run().unwrap(), 10);
    assert_eq!(dispatcher.metrics().unwrap().total_ticks(), 10);
}

#[test]
fn test_retarget_while_running() {
    let mut dispatcher = system_dispatcher(100.0, 0);
    dispatcher.initialize(None).unwrap();
    dispatcher.tick().unwrap();

    dispatcher.set_target(400.0);
    assert_eq!(dispatcher.cadence().interval(), Duration::from_micros(2_500));

    let times = TickTimes::default();
    times.attach(&dispatcher);
    for _ in 0..11 {
        dispatcher.tick().unwrap();
    }
    dispatcher.stop();

    let mean = times.mean_interval();
    assert!(
        mean < Duration::from_millis(4),
        "new rate not applied, mean interval {mean:?}"
    );
}
