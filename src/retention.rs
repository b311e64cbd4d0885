// Size rotation and age pruning for the append log and diagnostic logs.
// Runs on the hourly maintenance trigger. Rotation is rename-then-recreate
// on the same filesystem, so an appender never loses a file mid-write and
// readers never see a partial one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, Utc};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::persist;

const ARCHIVE_SUFFIX_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Default)]
pub struct RetentionReport {
    pub rotated: Vec<PathBuf>,
    pub pruned: usize,
}

pub struct RetentionManager {
    /// Files subject to size rotation (metric log, diagnostic logs).
    managed: Vec<PathBuf>,
    max_size_bytes: u64,
    archive_max_age: Duration,
}

impl RetentionManager {
    pub fn new(managed: Vec<PathBuf>, max_size_bytes: u64, archive_retention_days: u32) -> Self {
        Self {
            managed,
            max_size_bytes,
            archive_max_age: Duration::days(archive_retention_days as i64),
        }
    }

    /// Hourly pass: rotate every oversized managed file, then delete
    /// expired archives next to them. Per-file failures are logged and do
    /// not stop the pass.
    pub fn run(&self, now: DateTime<Local>) -> RetentionReport {
        let mut report = RetentionReport::default();

        for path in &self.managed {
            match rotate_if_oversized(path, self.max_size_bytes) {
                Ok(Some(archive)) => {
                    info!(file = %path.display(), archive = %archive.display(), "rotated oversized log");
                    report.rotated.push(archive);
                }
                Ok(None) => {}
                Err(e) => warn!(file = %path.display(), error = %e, "rotation failed"),
            }
        }

        for path in &self.managed {
            match prune_archives(path, now, self.archive_max_age) {
                Ok(n) => report.pruned += n,
                Err(e) => warn!(file = %path.display(), error = %e, "archive pruning failed"),
            }
        }

        if report.pruned > 0 {
            info!(pruned = report.pruned, "deleted expired log archives");
        }
        report
    }
}

/// Renames `path` to a timestamp-suffixed archive and recreates it empty
/// when it exceeds `max_size_bytes`. Returns the archive path if rotated.
pub fn rotate_if_oversized(path: &Path, max_size_bytes: u64) -> Result<Option<PathBuf>> {
    let size = match fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return Ok(None),
    };
    if size <= max_size_bytes {
        return Ok(None);
    }

    let suffix = Utc::now().format(ARCHIVE_SUFFIX_FORMAT).to_string();
    let archive = archive_path(path, &suffix);
    let wf = |e: std::io::Error| PipelineError::write_failure(path.display().to_string(), e);

    fs::rename(path, &archive).map_err(wf)?;
    fs::File::create(path).map_err(wf)?;
    persist::set_world_rw(path);
    Ok(Some(archive))
}

fn archive_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Deletes archives of `path` (same directory, `<name>.<digits>` pattern)
/// whose modification time is older than `max_age`. Returns the count.
pub fn prune_archives(path: &Path, now: DateTime<Local>, max_age: Duration) -> Result<usize> {
    let Some(dir) = path.parent() else {
        return Ok(0);
    };
    let Some(base) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(0);
    };
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            return Err(PipelineError::DirectoryUnwritable {
                path: dir.display().to_string(),
                detail: e.to_string(),
            });
        }
    };

    let cutoff = now - max_age;
    let mut pruned = 0usize;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(suffix) = name.strip_prefix(base).and_then(|r| r.strip_prefix('.')) else {
            continue;
        };
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let modified: Option<DateTime<Local>> = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Local>::from);
        let Some(modified) = modified else { continue };
        if modified < cutoff {
            match fs::remove_file(entry.path()) {
                Ok(()) => pruned += 1,
                Err(e) => {
                    warn!(archive = %entry.path().display(), error = %e, "failed to delete archive")
                }
            }
        }
    }
    Ok(pruned)
}
