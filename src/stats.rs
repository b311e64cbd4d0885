// Trailing-24h min/max summary. Recomputed from a full log scan each
// cycle; rotation keeps the log small enough that incremental state is
// not worth its failure modes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local};

use crate::error::Result;
use crate::models::{MetricSample, MinMax, StatsFile, StatsSummary};
use crate::persist;

pub const STATS_FILE_NAME: &str = "stats-24hr.json";

/// The stats window is fixed at 24 hours.
pub fn stats_window() -> Duration {
    Duration::hours(24)
}

pub struct StatsRepo {
    path: PathBuf,
}

impl StatsRepo {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STATS_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Computes the trailing-24h summary over `samples` and publishes it.
    pub fn publish(&self, samples: &[MetricSample], now: DateTime<Local>) -> Result<StatsSummary> {
        let summary = compute_stats(samples, now - stats_window());
        persist::write_json_atomic(&self.path, &StatsFile { stats: summary })?;
        Ok(summary)
    }
}

/// Min/max per metric over samples with `timestamp >= cutoff`.
///
/// Power min/max only considers readings > 0 ("unavailable" is encoded as
/// zero); when every in-window reading is zero, both report 0. An empty
/// window reports all zeros rather than an infinity sentinel.
pub fn compute_stats(samples: &[MetricSample], cutoff: DateTime<Local>) -> StatsSummary {
    let mut temperature: Option<MinMax> = None;
    let mut utilization: Option<MinMax> = None;
    let mut memory: Option<MinMax> = None;
    let mut power: Option<MinMax> = None;

    fn fold(acc: &mut Option<MinMax>, v: f64) {
        match acc {
            Some(mm) => {
                mm.min = mm.min.min(v);
                mm.max = mm.max.max(v);
            }
            None => *acc = Some(MinMax { min: v, max: v }),
        }
    }

    for s in samples {
        if s.timestamp < cutoff {
            continue;
        }
        fold(&mut temperature, s.temperature);
        fold(&mut utilization, s.utilization);
        fold(&mut memory, s.memory_used);
        if s.power > 0.0 {
            fold(&mut power, s.power);
        }
    }

    StatsSummary {
        temperature: temperature.unwrap_or_default(),
        utilization: utilization.unwrap_or_default(),
        memory: memory.unwrap_or_default(),
        power: power.unwrap_or_default(),
    }
}
