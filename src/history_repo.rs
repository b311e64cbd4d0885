// Rolling-window history documents, one JSON file per configured window
// plus a consolidated long-window document (`history.json`, trimmed by the
// daily retention pass).
//
// Documents are rebuilt on every flush cycle: load existing (corrupt or
// absent resets to empty), merge new samples deduplicated by display
// timestamp, drop entries outside the window+slack, sort ascending,
// publish atomically. Rebuilding is idempotent over an unchanged log.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, Local};
use tracing::{debug, error, warn};

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::models::{HistoryDocument, MetricSample, parse_display_timestamp};
use crate::persist;

pub const CONSOLIDATED_FILE_NAME: &str = "history.json";

#[derive(Debug, Clone)]
struct Window {
    name: String,
    duration: Duration,
}

pub struct HistoryRepo {
    data_dir: PathBuf,
    windows: Vec<Window>,
    consolidated: Window,
    slack: Duration,
}

impl HistoryRepo {
    pub fn new(data_dir: &Path, config: &HistoryConfig) -> Self {
        let windows = config
            .windows
            .iter()
            .map(|w| Window {
                name: w.name.clone(),
                duration: Duration::hours(w.hours as i64),
            })
            .collect();
        Self {
            data_dir: data_dir.to_path_buf(),
            windows,
            consolidated: Window {
                name: "consolidated".into(),
                duration: Duration::days(config.long_window_retention_days as i64),
            },
            slack: Duration::minutes(config.slack_minutes as i64),
        }
    }

    pub fn window_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("history-{}.json", name))
    }

    pub fn consolidated_path(&self) -> PathBuf {
        self.data_dir.join(CONSOLIDATED_FILE_NAME)
    }

    /// Loads a document; absence or corruption resets to empty (logged,
    /// never propagated).
    pub fn load_document(path: &Path) -> HistoryDocument {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HistoryDocument::default(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "history document unreadable, resetting");
                return HistoryDocument::default();
            }
        };
        match serde_json::from_str::<HistoryDocument>(&content) {
            Ok(doc) if doc.is_consistent() => doc,
            Ok(_) => {
                error!(path = %path.display(), "history document arrays misaligned, resetting");
                HistoryDocument::default()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "history document invalid JSON, resetting");
                HistoryDocument::default()
            }
        }
    }

    /// Rebuilds every window document plus the consolidated document from
    /// the newly flushed samples. Window failures are independent: one
    /// bad write does not stop the others; the last error is reported.
    pub fn update_all(&self, new_samples: &[MetricSample], now: DateTime<Local>) -> Result<()> {
        let mut targets: Vec<(PathBuf, &Window)> = self
            .windows
            .iter()
            .map(|w| (self.window_path(&w.name), w))
            .collect();
        targets.push((self.consolidated_path(), &self.consolidated));

        let mut last_err = None;
        for (path, window) in targets {
            if let Err(e) = self.update_window(&path, window, new_samples, now) {
                warn!(window = %window.name, error = %e, "history window update failed");
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn update_window(
        &self,
        path: &Path,
        window: &Window,
        new_samples: &[MetricSample],
        now: DateTime<Local>,
    ) -> Result<()> {
        let existing = Self::load_document(path);
        let merged = merge_window(&existing, new_samples, window.duration, self.slack, now);
        debug!(
            window = %window.name,
            entries = merged.len(),
            "history window rebuilt"
        );
        persist::write_json_atomic(path, &merged)
    }

    /// Daily retention pass: drops consolidated entries older than the
    /// long-window maximum age.
    pub fn trim_consolidated(&self, now: DateTime<Local>) -> Result<usize> {
        let path = self.consolidated_path();
        let existing = Self::load_document(&path);
        if existing.is_empty() {
            return Ok(0);
        }
        let before = existing.len();
        let trimmed = merge_window(&existing, &[], self.consolidated.duration, self.slack, now);
        let dropped = before.saturating_sub(trimmed.len());
        if dropped > 0 {
            persist::write_json_atomic(&path, &trimmed)?;
        }
        Ok(dropped)
    }
}

/// Pure merge: existing document entries + new samples, deduplicated by
/// display timestamp, filtered to `[now - window - slack, now + slack]`,
/// sorted timestamp-ascending.
///
/// Existing entries carry year-less timestamps and are interpreted with
/// the current year; an entry that resolves into the future (a December
/// timestamp read in January) is pulled back one year before filtering,
/// which is what the slack margin exists to tolerate.
pub fn merge_window(
    existing: &HistoryDocument,
    new_samples: &[MetricSample],
    window: Duration,
    slack: Duration,
    now: DateTime<Local>,
) -> HistoryDocument {
    let cutoff = now - window - slack;
    let future_limit = now + slack;

    struct Entry {
        resolved: DateTime<Local>,
        timestamp: String,
        temperature: f64,
        utilization: f64,
        memory: f64,
        power: f64,
    }

    let mut entries: Vec<Entry> = Vec::with_capacity(existing.len() + new_samples.len());
    let mut seen: std::collections::HashSet<String> =
        std::collections::HashSet::with_capacity(existing.len() + new_samples.len());

    for i in 0..existing.len() {
        let ts = &existing.timestamps[i];
        let Some(mut resolved) = parse_display_timestamp(ts, now) else {
            continue;
        };
        if resolved > future_limit
            && let Some(back) = resolved.with_year(resolved.year() - 1)
        {
            resolved = back;
        }
        if resolved < cutoff || !seen.insert(ts.clone()) {
            continue;
        }
        entries.push(Entry {
            resolved,
            timestamp: ts.clone(),
            temperature: existing.temperatures[i],
            utilization: existing.utilizations[i],
            memory: existing.memory[i],
            power: existing.power[i],
        });
    }

    for s in new_samples {
        if s.timestamp < cutoff {
            continue;
        }
        let ts = s.display_timestamp();
        if !seen.insert(ts.clone()) {
            continue;
        }
        entries.push(Entry {
            resolved: s.timestamp,
            timestamp: ts,
            temperature: s.temperature,
            utilization: s.utilization,
            memory: s.memory_used,
            power: s.power,
        });
    }

    entries.sort_by(|a, b| {
        a.resolved
            .cmp(&b.resolved)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let mut out = HistoryDocument::default();
    for e in entries {
        out.push(e.timestamp, e.temperature, e.utilization, e.memory, e.power);
    }
    out
}
