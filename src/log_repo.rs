// Append-only metric log. Single writer (this process); the aggregators
// only read it. Flushes are staged: the batch is made durable in a
// staging file before it is appended to the log, so a crash at any point
// loses nothing. A crash between the log append and the staging cleanup
// re-appends the batch on recovery; history dedup absorbs the duplicates.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::models::MetricSample;
use crate::persist;

pub const LOG_FILE_NAME: &str = "gpu-metrics.csv";
const STAGING_SUFFIX: &str = ".staging";

pub struct MetricLog {
    path: PathBuf,
    staging: PathBuf,
}

impl MetricLog {
    pub fn new(data_dir: &Path) -> Self {
        let path = data_dir.join(LOG_FILE_NAME);
        let staging = data_dir.join(format!("{}{}", LOG_FILE_NAME, STAGING_SUFFIX));
        Self { path, staging }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a batch through the staging file.
    ///
    /// 1. Write the batch to the staging file and fsync.
    /// 2. Append the staged bytes to the log and fsync.
    /// 3. Remove the staging file.
    ///
    /// The caller clears its in-memory buffer only on `Ok`; on `Err` the
    /// buffer stays intact and a later tick retries.
    pub fn append_batch(&self, samples: &[MetricSample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        // A leftover staging file from an earlier failed flush is drained
        // first so truncating it below cannot drop samples.
        self.recover_staging()?;

        let mut content = String::new();
        for s in samples {
            content.push_str(&s.to_log_line());
            content.push('\n');
        }

        let wf =
            |e: std::io::Error| PipelineError::write_failure(self.staging.display().to_string(), e);
        let mut f = fs::File::create(&self.staging).map_err(wf)?;
        f.write_all(content.as_bytes()).map_err(wf)?;
        f.sync_all().map_err(wf)?;
        drop(f);

        persist::append_durable(&self.path, content.as_bytes())?;
        fs::remove_file(&self.staging).map_err(|e| {
            PipelineError::write_failure(self.staging.display().to_string(), e)
        })?;
        Ok(())
    }

    /// Drains a leftover staging file into the log. Called at startup and
    /// before every staged flush. Returns the number of bytes recovered.
    pub fn recover_staging(&self) -> Result<u64> {
        let Ok(meta) = fs::metadata(&self.staging) else {
            return Ok(0);
        };
        if meta.len() == 0 {
            let _ = fs::remove_file(&self.staging);
            return Ok(0);
        }
        let bytes = fs::read(&self.staging).map_err(|e| {
            PipelineError::write_failure(self.staging.display().to_string(), e)
        })?;
        persist::append_durable(&self.path, &bytes)?;
        fs::remove_file(&self.staging).map_err(|e| {
            PipelineError::write_failure(self.staging.display().to_string(), e)
        })?;
        warn!(
            bytes = meta.len(),
            "recovered staged samples from interrupted flush"
        );
        Ok(meta.len())
    }

    /// All parseable samples in the current log, in append order.
    /// Malformed lines are counted and skipped, never fatal.
    pub fn read_all(&self) -> Result<Vec<MetricSample>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PipelineError::write_failure(
                    self.path.display().to_string(),
                    e,
                ));
            }
        };

        let mut samples = Vec::new();
        let mut skipped = 0usize;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match MetricSample::from_log_line(line) {
                Ok(s) => samples.push(s),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, path = %self.path.display(), "skipped malformed log lines");
        }
        Ok(samples)
    }

    /// Samples with `timestamp >= cutoff`, in append order.
    pub fn read_since(&self, cutoff: DateTime<Local>) -> Result<Vec<MetricSample>> {
        let mut samples = self.read_all()?;
        samples.retain(|s| s.timestamp >= cutoff);
        Ok(samples)
    }

    /// Current log size in bytes (0 when absent).
    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}
