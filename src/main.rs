use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use gpumon::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DIAG_LOG_FILE_NAME: &str = "gpumon.log";
const GPU_INFO_FILE_NAME: &str = "config.json";

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let app_config = config::AppConfig::load()?;

    let data_dir = Path::new(&app_config.paths.data_dir).to_path_buf();
    let log_dir = Path::new(&app_config.paths.log_dir).to_path_buf();

    // Directory bootstrap is the only fatal failure mode; everything past
    // this point recovers and continues.
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    persist::check_dir_writable(&data_dir)?;
    persist::check_dir_writable(&log_dir)?;

    let diag_path = log_dir.join(DIAG_LOG_FILE_NAME);
    let diag_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&diag_path)
        .with_context(|| format!("opening diagnostic log {}", diag_path.display()))?;
    persist::set_world_rw(&diag_path);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_ansi(false)
                .with_writer(Arc::new(diag_file)),
        )
        .init();

    tracing::info!(
        name = version::NAME,
        version = version::VERSION,
        data_dir = %data_dir.display(),
        "starting collector"
    );

    // GPU identity discovery, written once for the display frontend. A
    // failed discovery is not fatal; sampling may still come up later.
    let gpu_info_path = data_dir.join(GPU_INFO_FILE_NAME);
    let gpu_name = match source::discover_gpu_name("nvidia-smi").await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(error = %e, "GPU name discovery failed");
            "Unknown GPU".to_string()
        }
    };
    if let Err(e) = persist::write_json_atomic(&gpu_info_path, &models::GpuInfo { gpu_name }) {
        tracing::warn!(error = %e, "writing GPU info file failed");
    }

    let log = log_repo::MetricLog::new(&data_dir);
    if let Err(e) = log.recover_staging() {
        tracing::warn!(error = %e, "staging recovery failed; will retry on next flush");
    }

    let history = history_repo::HistoryRepo::new(&data_dir, &app_config.history);
    let stats = stats::StatsRepo::new(&data_dir);
    let snapshot = snapshot::SnapshotWriter::new(&data_dir);

    // Startup repair: a crash between backup and rename leaves a .bak
    // next to a missing target.
    for path in [
        snapshot.path().to_path_buf(),
        stats.path().to_path_buf(),
        history.consolidated_path(),
    ] {
        if let Err(e) = persist::restore_backup_if_needed(&path) {
            tracing::warn!(path = %path.display(), error = %e, "backup restore failed");
        }
    }

    let retention = retention::RetentionManager::new(
        vec![log.path().to_path_buf(), diag_path.clone()],
        app_config.retention.max_log_size_bytes,
        app_config.retention.archive_retention_days,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            source: Arc::new(source::NvidiaSmiSource::new()),
            log,
            history,
            stats,
            snapshot,
            retention,
            shutdown_rx,
        },
        worker::WorkerConfig {
            sample_interval: std::time::Duration::from_secs(app_config.sampling.interval_secs),
            buffer_size: app_config.sampling.buffer_size,
            retry: worker::RetryPolicy {
                max_attempts: app_config.sampling.max_attempts,
                backoff: std::time::Duration::from_secs(app_config.sampling.retry_backoff_secs),
            },
        },
    );

    wait_for_shutdown_signal().await;
    tracing::info!("received shutdown signal");
    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;

    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
