// Sampling loop and maintenance driver. One cooperative task: sample on a
// fixed tick with bounded retry, publish the snapshot immediately, buffer
// samples and flush them to the append log at capacity, rebuild the
// aggregate views after each flush. Hourly and daily maintenance arrive
// over channels from cron scheduler tasks.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::history_repo::HistoryRepo;
use crate::log_repo::MetricLog;
use crate::models::MetricSample;
use crate::retention::RetentionManager;
use crate::sampler::Sampler;
use crate::snapshot::SnapshotWriter;
use crate::source::SampleSource;
use crate::stats::StatsRepo;

/// Hourly maintenance point: minute 0, local time.
pub const HOURLY_SCHEDULE: &str = "0 0 * * * *";
/// Daily maintenance point: midnight, local time.
pub const DAILY_SCHEDULE: &str = "0 0 0 * * *";

/// Repos and shutdown for the worker.
pub struct WorkerDeps {
    pub source: Arc<dyn SampleSource>,
    pub log: MetricLog,
    pub history: HistoryRepo,
    pub stats: StatsRepo,
    pub snapshot: SnapshotWriter,
    pub retention: RetentionManager,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Fixed per-tick retry policy for the sample source.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

pub struct WorkerConfig {
    pub sample_interval: Duration,
    pub buffer_size: usize,
    pub retry: RetryPolicy,
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(deps, config).await;
    })
}

async fn run(deps: WorkerDeps, config: WorkerConfig) {
    let WorkerDeps {
        source,
        log,
        history,
        stats,
        snapshot,
        retention,
        mut shutdown_rx,
    } = deps;

    let sampler = Sampler::new(source);
    let mut buffer: Vec<MetricSample> = Vec::with_capacity(config.buffer_size);

    let mut tick = interval(config.sample_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (hourly_tx, mut hourly_rx) = mpsc::channel::<()>(1);
    let (daily_tx, mut daily_rx) = mpsc::channel::<()>(1);
    tokio::spawn(cron_scheduler(HOURLY_SCHEDULE, hourly_tx));
    tokio::spawn(cron_scheduler(DAILY_SCHEDULE, daily_tx));

    let mut ticks_failed_total: u64 = 0;
    let mut flushes_total: u64 = 0;

    let worker_span = tracing::span!(
        tracing::Level::DEBUG,
        "worker",
        interval_ms = config.sample_interval.as_millis() as u64
    );
    let _guard = worker_span.enter();

    loop {
        tokio::select! {
            _ = tick.tick() => {
                match sample_with_retry(&sampler, config.retry).await {
                    Ok(sample) => {
                        if let Err(e) = snapshot.publish(&sample) {
                            warn!(error = %e, operation = "publish_snapshot", "snapshot publish failed");
                        }
                        buffer.push(sample);
                        if buffer.len() >= config.buffer_size {
                            match flush_and_aggregate(&log, &history, &stats, &mut buffer) {
                                Ok(()) => flushes_total += 1,
                                Err(e) => warn!(
                                    error = %e,
                                    pending = buffer.len(),
                                    operation = "flush",
                                    "flush failed; samples retained for retry"
                                ),
                            }
                        }
                    }
                    Err(e) => {
                        ticks_failed_total += 1;
                        warn!(
                            error = %e,
                            ticks_failed_total,
                            operation = "sample",
                            "giving up on this tick"
                        );
                    }
                }
            }
            _ = hourly_rx.recv() => {
                let report = retention.run(Local::now());
                debug!(
                    rotated = report.rotated.len(),
                    pruned = report.pruned,
                    flushes_total,
                    "hourly maintenance complete"
                );
            }
            _ = daily_rx.recv() => {
                match history.trim_consolidated(Local::now()) {
                    Ok(dropped) => {
                        if dropped > 0 {
                            info!(dropped, operation = "trim_consolidated", "trimmed long-window history");
                        }
                    }
                    Err(e) => warn!(error = %e, operation = "trim_consolidated", "history trim failed"),
                }
            }
            _ = &mut shutdown_rx => {
                debug!("worker shutting down");
                break;
            }
        }
    }

    // Final flush so buffered samples survive a clean shutdown.
    if !buffer.is_empty()
        && let Err(e) = flush_and_aggregate(&log, &history, &stats, &mut buffer)
    {
        warn!(error = %e, pending = buffer.len(), "final flush failed");
    }
}

/// Samples with up to `retry.max_attempts` attempts and a fixed backoff
/// between them. A single bad tick never halts the loop; the caller logs
/// and moves on.
pub async fn sample_with_retry(
    sampler: &Sampler,
    retry: RetryPolicy,
) -> Result<MetricSample> {
    let mut attempt = 1;
    loop {
        match sampler.sample().await {
            Ok(sample) => return Ok(sample),
            Err(e) if attempt < retry.max_attempts => {
                debug!(error = %e, attempt, "sample attempt failed, retrying");
                attempt += 1;
                tokio::time::sleep(retry.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Flushes the buffer through the staged append, then rebuilds history and
/// stats from the flushed batch. The buffer is cleared only after the log
/// append is confirmed; aggregate failures are reported but do not bring
/// the flushed samples back.
pub fn flush_and_aggregate(
    log: &MetricLog,
    history: &HistoryRepo,
    stats: &StatsRepo,
    buffer: &mut Vec<MetricSample>,
) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }

    log.append_batch(buffer)?;
    let batch = std::mem::take(buffer);
    debug!(samples = batch.len(), operation = "flush", "buffer flushed to log");

    let now = Local::now();
    if let Err(e) = history.update_all(&batch, now) {
        warn!(error = %e, operation = "update_history", "history update failed");
    }
    match log.read_all() {
        Ok(samples) => {
            if let Err(e) = stats.publish(&samples, now) {
                warn!(error = %e, operation = "publish_stats", "stats publish failed");
            }
        }
        Err(e) => warn!(error = %e, operation = "read_log", "log scan for stats failed"),
    }
    Ok(())
}

/// Sends on `tx` at each local-time cron point. Scheduling lives in its
/// own task so the worker loop stays a single select.
async fn cron_scheduler(expr: &'static str, tx: mpsc::Sender<()>) {
    let Ok(schedule) = cron::Schedule::from_str(expr) else {
        warn!(cron = expr, "invalid maintenance schedule; pass will not run");
        return;
    };
    loop {
        let now = chrono::Local::now();
        let Some(next) = schedule.after(&now).next() else {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            continue;
        };
        let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
        tokio::time::sleep(delay).await;
        if tx.send(()).await.is_err() {
            break;
        }
    }
}
