// Config loading and validation tests

use gpumon::config::AppConfig;

const VALID_CONFIG: &str = r#"
[paths]
data_dir = "history"
log_dir = "logs"

[sampling]
interval_secs = 4
buffer_size = 15
max_attempts = 3
retry_backoff_secs = 1

[history]
windows = [
    { name = "1hr", hours = 1 },
    { name = "6hr", hours = 6 },
    { name = "12hr", hours = 12 },
    { name = "24hr", hours = 24 },
]
slack_minutes = 10
long_window_retention_days = 7

[retention]
max_log_size_bytes = 10485760
archive_retention_days = 2
"#;

#[test]
fn config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.paths.data_dir, "history");
    assert_eq!(config.sampling.interval_secs, 4);
    assert_eq!(config.sampling.buffer_size, 15);
    assert_eq!(config.history.windows.len(), 4);
    assert_eq!(config.history.windows[0].name, "1hr");
    assert_eq!(config.history.windows[3].hours, 24);
    assert_eq!(config.retention.max_log_size_bytes, 10 * 1024 * 1024);
}

#[test]
fn config_defaults_apply_when_optional_keys_missing() {
    let minimal = r#"
[paths]
data_dir = "history"
log_dir = "logs"

[sampling]
interval_secs = 4

[history]
windows = [{ name = "24hr", hours = 24 }]

[retention]
"#;
    let config = AppConfig::load_from_str(minimal).expect("load_from_str");
    assert_eq!(config.sampling.buffer_size, 15);
    assert_eq!(config.sampling.max_attempts, 3);
    assert_eq!(config.sampling.retry_backoff_secs, 1);
    assert_eq!(config.history.slack_minutes, 10);
    assert_eq!(config.history.long_window_retention_days, 7);
    assert_eq!(config.retention.max_log_size_bytes, 10 * 1024 * 1024);
    assert_eq!(config.retention.archive_retention_days, 2);
}

#[test]
fn config_rejects_empty_data_dir() {
    let bad = VALID_CONFIG.replace("data_dir = \"history\"", "data_dir = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("paths.data_dir"));
}

#[test]
fn config_rejects_zero_interval() {
    let bad = VALID_CONFIG.replace("interval_secs = 4", "interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sampling.interval_secs"));
}

#[test]
fn config_rejects_zero_buffer_size() {
    let bad = VALID_CONFIG.replace("buffer_size = 15", "buffer_size = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sampling.buffer_size"));
}

#[test]
fn config_rejects_empty_window_list() {
    let bad = r#"
[paths]
data_dir = "history"
log_dir = "logs"

[sampling]
interval_secs = 4

[history]
windows = []

[retention]
"#;
    let err = AppConfig::load_from_str(bad).unwrap_err();
    assert!(err.to_string().contains("history.windows"));
}

#[test]
fn config_rejects_zero_hour_window() {
    let bad = VALID_CONFIG.replace("{ name = \"1hr\", hours = 1 }", "{ name = \"1hr\", hours = 0 }");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("hours must be > 0"));
}

#[test]
fn config_rejects_zero_rotation_threshold() {
    let bad = VALID_CONFIG.replace("max_log_size_bytes = 10485760", "max_log_size_bytes = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("retention.max_log_size_bytes"));
}
