//! Configuration files feeding a runtime, and the demo workload end to end.

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tickio::demo::run_demo;
use tickio::runtime::clock::ManualClock;
use tickio::util::config::{load_config, ConfigError, RuntimeConfig};
use tickio::util::logger::LogLevel;
use tickio::Runtime;

#[test]
fn test_config_file_shapes_runtime() {
    let config = RuntimeConfig::from_toml_str(
        r#"
        [scheduler]
        tick_ms = 5
        default_priority = 2

        [workers]
        concurrency = 6

        [log]
        level = "warn"
        "#,
    )
    .unwrap();
    assert_eq!(config.log.level, LogLevel::Warn);

    let rt = Runtime::builder()
        .config(config)
        .clock(ManualClock::new())
        .build();
    assert_eq!(rt.workers().concurrency(), 6);
    assert_eq!(rt.submit(|| ()).priority().value(), 2);
}

#[test]
fn test_invalid_file_is_reported() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[scheduler]\ntick_ms = 0").unwrap();

    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let missing = file.path().with_extension("absent");
    let err = load_config(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent"));
}

#[test]
fn test_demo_runs_every_feature_briefly() {
    let stats = run_demo(RuntimeConfig::default(), Duration::from_millis(100)).unwrap();

    assert!(stats.tasks_executed > 0);
    assert!(stats.pool_admitted >= 3);
    assert_eq!(stats.tasks_failed, 0);
}

#[test]
fn test_demo_rejects_invalid_config() {
    let mut config = RuntimeConfig::default();
    config.scheduler.tick_ms = 0;
    assert!(run_demo(config, Duration::from_millis(10)).is_err());
}
