use std::time::{Duration, Instant};

use db_manager::prelude::*;
use db_manager::test_utils::{ScriptedAdapter, ScriptedDriver};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn options(attempts: u32, delay: Duration) -> ConnectionOptions {
    ConnectionOptions::builder(Engine::Postgres, "db.internal", "app", "pw", "shop")
        .retry_attempts(attempts)
        .retry_delay(delay)
        .finish()
        .unwrap()
}

#[test]
fn transient_failures_are_retried_with_fixed_delay() {
    init_logging();
    let delay = Duration::from_millis(50);
    let driver = ScriptedDriver::new(ScriptedAdapter::emulated()).failing_first(2);
    let started = Instant::now();

    let manager = ConnectionManager::connect_with(options(3, delay), &driver).unwrap();

    assert!(manager.is_connected());
    assert_eq!(driver.attempts(), 3);
    assert!(started.elapsed() >= delay * 2);
    let times = driver.attempt_times();
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= delay);
    }
}

#[test]
fn exhausted_retries_report_attempt_count_without_trailing_sleep() {
    init_logging();
    let delay = Duration::from_millis(40);
    let driver = ScriptedDriver::new(ScriptedAdapter::emulated()).failing_first(u32::MAX);
    let started = Instant::now();

    let err = ConnectionManager::connect_with(options(3, delay), &driver).unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Connection);
    match &err {
        DbManagerError::ConnectionError { attempts, source } => {
            assert_eq!(*attempts, 3);
            assert!(source.to_string().contains("attempt 3"));
        }
        other => panic!("expected ConnectionError, got {other:?}"),
    }
    assert_eq!(driver.attempts(), 3);
    assert!(elapsed >= delay * 2);
    let last = *driver.attempt_times().last().unwrap();
    assert!(last.elapsed() < delay);
}

#[test]
fn single_attempt_does_not_sleep() {
    let delay = Duration::from_secs(5);
    let driver = ScriptedDriver::new(ScriptedAdapter::emulated()).failing_first(1);
    let started = Instant::now();
    let err = ConnectionManager::connect_with(options(1, delay), &driver).unwrap_err();
    assert!(matches!(err, DbManagerError::ConnectionError { attempts: 1, .. }));
    assert!(started.elapsed() < delay);
}

#[cfg(feature = "postgres")]
#[test]
fn unreachable_postgres_fails_after_every_attempt() {
    let delay = Duration::from_millis(20);
    let opts = ConnectionOptions::builder(Engine::Postgres, "127.0.0.1", "app", "pw", "shop")
        .port(1)
        .timeout(Duration::from_secs(2))
        .retry_attempts(3)
        .retry_delay(delay)
        .finish()
        .unwrap();
    let started = Instant::now();
    let err = ConnectionManager::connect(opts).unwrap_err();
    assert!(matches!(err, DbManagerError::ConnectionError { attempts: 3, .. }));
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(started.elapsed() >= delay * 2);
}

#[cfg(not(feature = "mssql"))]
#[test]
fn engine_without_its_feature_is_a_configuration_error() {
    let opts = ConnectionOptions::new(Engine::Mssql, "db", "sa", "pw", "shop");
    let err = ConnectionManager::connect(opts).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
