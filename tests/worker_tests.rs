// Worker tests: retry policy, flush discipline, spawn/shutdown flush.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeSource, ScriptStep, now_secs, sample_at};
use gpumon::config::HistoryConfig;
use gpumon::history_repo::HistoryRepo;
use gpumon::log_repo::MetricLog;
use gpumon::retention::RetentionManager;
use gpumon::sampler::Sampler;
use gpumon::snapshot::SnapshotWriter;
use gpumon::stats::StatsRepo;
use gpumon::worker::{
    RetryPolicy, WorkerConfig, WorkerDeps, flush_and_aggregate, sample_with_retry, spawn,
};
use tempfile::TempDir;

fn test_history_config() -> HistoryConfig {
    toml::from_str(
        r#"
windows = [{ name = "1hr", hours = 1 }]
slack_minutes = 10
long_window_retention_days = 7
"#,
    )
    .unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn sample_with_retry_recovers_from_transient_failures() {
    let source = Arc::new(FakeSource::new(vec![
        ScriptStep::Fail("no output".into()),
        ScriptStep::Fail("no output".into()),
        ScriptStep::Line("45, 60, 2048, 120".into()),
    ]));
    let sampler = Sampler::new(source);

    let sample = sample_with_retry(&sampler, fast_retry()).await.unwrap();
    assert_eq!(sample.temperature, 45.0);
}

#[tokio::test]
async fn sample_with_retry_gives_up_after_max_attempts() {
    let source = Arc::new(FakeSource::new(vec![
        ScriptStep::Fail("down".into()),
        ScriptStep::Fail("down".into()),
        ScriptStep::Fail("down".into()),
        ScriptStep::Line("45, 60, 2048, 120".into()),
    ]));
    let sampler = Sampler::new(source.clone());

    assert!(sample_with_retry(&sampler, fast_retry()).await.is_err());
    // The next tick gets a fresh attempt budget and succeeds.
    assert!(sample_with_retry(&sampler, fast_retry()).await.is_ok());
}

#[test]
fn flush_and_aggregate_clears_buffer_and_rebuilds_views() {
    let dir = TempDir::new().unwrap();
    let log = MetricLog::new(dir.path());
    let history = HistoryRepo::new(dir.path(), &test_history_config());
    let stats = StatsRepo::new(dir.path());
    let now = now_secs();

    let mut buffer: Vec<_> = (0..15)
        .map(|i| sample_at(now, (15 - i) * 4, 30.0 + i as f64))
        .collect();

    flush_and_aggregate(&log, &history, &stats, &mut buffer).unwrap();

    assert!(buffer.is_empty());
    assert_eq!(log.read_all().unwrap().len(), 15);
    let doc = HistoryRepo::load_document(&dir.path().join("history-1hr.json"));
    assert_eq!(doc.len(), 15);
    assert!(dir.path().join("stats-24hr.json").exists());
}

#[test]
fn flush_failure_keeps_buffer_for_retry() {
    let dir = TempDir::new().unwrap();
    let log = MetricLog::new(dir.path());
    let history = HistoryRepo::new(dir.path(), &test_history_config());
    let stats = StatsRepo::new(dir.path());
    let now = now_secs();

    // A directory at the log path makes the append fail.
    std::fs::create_dir(dir.path().join("gpu-metrics.csv")).unwrap();

    let mut buffer = vec![sample_at(now, 4, 40.0), sample_at(now, 0, 41.0)];
    let err = flush_and_aggregate(&log, &history, &stats, &mut buffer);

    assert!(err.is_err());
    assert_eq!(buffer.len(), 2);
}

#[test]
fn flush_with_empty_buffer_is_noop() {
    let dir = TempDir::new().unwrap();
    let log = MetricLog::new(dir.path());
    let history = HistoryRepo::new(dir.path(), &test_history_config());
    let stats = StatsRepo::new(dir.path());

    let mut buffer = Vec::new();
    flush_and_aggregate(&log, &history, &stats, &mut buffer).unwrap();
    assert_eq!(log.size_bytes(), 0);
}

#[test]
fn duplicate_log_entries_collapse_in_history() {
    let dir = TempDir::new().unwrap();
    let log = MetricLog::new(dir.path());
    let history = HistoryRepo::new(dir.path(), &test_history_config());
    let stats = StatsRepo::new(dir.path());
    let now = now_secs();

    // The same batch appended twice (the crash-between-append-and-clear
    // window); history must contain each timestamp once.
    let batch = vec![sample_at(now, 4, 40.0), sample_at(now, 0, 41.0)];
    let mut first = batch.clone();
    flush_and_aggregate(&log, &history, &stats, &mut first).unwrap();
    let mut second = batch.clone();
    flush_and_aggregate(&log, &history, &stats, &mut second).unwrap();

    assert_eq!(log.read_all().unwrap().len(), 4);
    let doc = HistoryRepo::load_document(&dir.path().join("history-1hr.json"));
    assert_eq!(doc.len(), 2);
}

#[tokio::test]
async fn worker_spawn_ticks_and_shutdown_flushes_buffer() {
    let dir = TempDir::new().unwrap();

    let lines: Vec<String> = (0..5).map(|i| format!("{}, 60, 2048, 120", 40 + i)).collect();
    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let source = Arc::new(FakeSource::lines(&line_refs));

    let log = MetricLog::new(dir.path());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let deps = WorkerDeps {
        source,
        log,
        history: HistoryRepo::new(dir.path(), &test_history_config()),
        stats: StatsRepo::new(dir.path()),
        snapshot: SnapshotWriter::new(dir.path()),
        retention: RetentionManager::new(vec![dir.path().join("gpu-metrics.csv")], 1024 * 1024, 2),
        shutdown_rx,
    };
    let config = WorkerConfig {
        sample_interval: Duration::from_millis(10),
        // Larger than the script so the log is only written by the final
        // shutdown flush.
        buffer_size: 100,
        retry: RetryPolicy {
            max_attempts: 1,
            backoff: Duration::from_millis(1),
        },
    };

    let handle = spawn(deps, config);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let _ = shutdown_tx.send(());
    handle.await.unwrap();

    let log = MetricLog::new(dir.path());
    let samples = log.read_all().unwrap();
    assert_eq!(samples.len(), 5, "shutdown must flush all buffered samples");
    // Snapshot reflects the last successful sample.
    let snap = std::fs::read_to_string(dir.path().join("current.json")).unwrap();
    assert!(snap.contains("\"temperature\": 44"));
}
