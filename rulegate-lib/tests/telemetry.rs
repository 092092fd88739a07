use serial_test::serial;

use rulegate_lib::telemetry::init_tracing;

#[test]
#[serial]
fn test_init_tracing_installs_global_subscriber() {
    // another test in this binary may already have installed it
    let _ = init_tracing("debug", true);
    assert!(tracing::dispatcher::has_been_set());
}

#[test]
#[serial]
fn test_init_tracing_twice_fails() {
    let _ = init_tracing("info", false);
    assert!(init_tracing("info", false).is_err());
}
