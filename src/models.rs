// Domain models: samples, history documents, stats summary, GPU identity.
//
// Canonical timestamps are full local date+times; the year-less
// `MM-DD HH:MM:SS` string the display frontend consumes is produced only
// at the boundary (snapshot/history JSON). Log lines carry the year so
// recovery and window filtering stay unambiguous across New Year.

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Timestamp format for append-log lines (full year).
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Year-less timestamp format exposed to the display layer.
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%m-%d %H:%M:%S";

/// One validated sample. `power == 0.0` encodes "unavailable".
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub timestamp: DateTime<Local>,
    pub temperature: f64,
    pub utilization: f64,
    pub memory_used: f64,
    pub power: f64,
}

impl MetricSample {
    /// Year-less timestamp string, the dedup key for history documents.
    pub fn display_timestamp(&self) -> String {
        self.timestamp.format(DISPLAY_TIMESTAMP_FORMAT).to_string()
    }

    /// CSV line for the append log: `timestamp,temp,util,memory,power`.
    pub fn to_log_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp.format(LOG_TIMESTAMP_FORMAT),
            self.temperature,
            self.utilization,
            self.memory_used,
            self.power
        )
    }

    /// Parses one append-log line. Malformed lines are a `ParseFailure`
    /// the aggregators skip, never fatal to a pass.
    pub fn from_log_line(line: &str) -> Result<Self, PipelineError> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() != 5 {
            return Err(PipelineError::ParseFailure(format!(
                "expected 5 fields, got {}: {:?}",
                fields.len(),
                line
            )));
        }
        let naive = NaiveDateTime::parse_from_str(fields[0], LOG_TIMESTAMP_FORMAT)
            .map_err(|e| PipelineError::ParseFailure(format!("timestamp {:?}: {}", fields[0], e)))?;
        let timestamp = local_from_naive(naive).ok_or_else(|| {
            PipelineError::ParseFailure(format!("non-existent local time {:?}", fields[0]))
        })?;
        let num = |idx: usize, name: &str| -> Result<f64, PipelineError> {
            fields[idx].trim().parse::<f64>().map_err(|e| {
                PipelineError::ParseFailure(format!("{} {:?}: {}", name, fields[idx], e))
            })
        };
        Ok(Self {
            timestamp,
            temperature: num(1, "temperature")?,
            utilization: num(2, "utilization")?,
            memory_used: num(3, "memory")?,
            power: num(4, "power")?,
        })
    }
}

/// Resolves a naive local time; for the DST fold the earlier instant wins.
pub fn local_from_naive(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&naive).earliest()
}

/// Parses a year-less display timestamp against the year of `now`.
/// Returns `None` for strings that do not form a valid local time
/// (including Feb 29 reinterpreted in a non-leap year).
pub fn parse_display_timestamp(s: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let with_year = format!("{}-{}", now.year(), s);
    let naive = NaiveDateTime::parse_from_str(&with_year, LOG_TIMESTAMP_FORMAT).ok()?;
    local_from_naive(naive)
}

/// Most recent sample, published atomically each tick for the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSnapshot {
    pub timestamp: String,
    pub temperature: f64,
    pub utilization: f64,
    pub memory: f64,
    pub power: f64,
}

impl From<&MetricSample> for CurrentSnapshot {
    fn from(s: &MetricSample) -> Self {
        Self {
            timestamp: s.display_timestamp(),
            temperature: s.temperature,
            utilization: s.utilization,
            memory: s.memory_used,
            power: s.power,
        }
    }
}

/// One rolling-window time series: parallel arrays aligned by index,
/// timestamp-ascending, no duplicate timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryDocument {
    pub timestamps: Vec<String>,
    pub temperatures: Vec<f64>,
    pub utilizations: Vec<f64>,
    pub memory: Vec<f64>,
    pub power: Vec<f64>,
}

impl HistoryDocument {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn push(
        &mut self,
        timestamp: String,
        temperature: f64,
        utilization: f64,
        memory: f64,
        power: f64,
    ) {
        self.timestamps.push(timestamp);
        self.temperatures.push(temperature);
        self.utilizations.push(utilization);
        self.memory.push(memory);
        self.power.push(power);
    }

    /// True when the parallel arrays agree in length (a corrupt document
    /// fails this and is reset by the loader).
    pub fn is_consistent(&self) -> bool {
        let n = self.timestamps.len();
        self.temperatures.len() == n
            && self.utilizations.len() == n
            && self.memory.len() == n
            && self.power.len() == n
    }
}

/// Min/max for one metric.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

/// Trailing-24h per-metric extremes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsSummary {
    pub temperature: MinMax,
    pub utilization: MinMax,
    pub memory: MinMax,
    pub power: MinMax,
}

/// On-disk wrapper for the stats file: `{"stats": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsFile {
    pub stats: StatsSummary,
}

/// Static GPU identity; discovered once at startup, read-only to the
/// frontend thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuInfo {
    pub gpu_name: String,
}
