// Turns raw source output into validated samples.

use std::sync::Arc;

use chrono::{Local, Timelike};

use crate::error::{PipelineError, Result};
use crate::models::MetricSample;
use crate::source::SampleSource;

pub struct Sampler {
    source: Arc<dyn SampleSource>,
}

impl Sampler {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self { source }
    }

    /// One sampling attempt: query the source, parse, stamp with the
    /// current local time at second precision.
    pub async fn sample(&self) -> Result<MetricSample> {
        let line = self.source.query().await?;
        let (temperature, utilization, memory_used, power) = parse_reading(&line)?;
        let now = Local::now();
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        Ok(MetricSample {
            timestamp,
            temperature,
            utilization,
            memory_used,
            power,
        })
    }
}

/// Parses one raw `temp,util,memory,power` line.
///
/// Temperature, utilization, and memory must all parse; a bad value in any
/// of them fails the whole tick (no partial samples). Power is optional:
/// nvidia-smi reports `[N/A]` on unsupported boards, and any non-numeric
/// power token normalizes to 0.0.
pub fn parse_reading(line: &str) -> Result<(f64, f64, f64, f64)> {
    let line = line.trim();
    if line.is_empty() {
        return Err(PipelineError::SourceUnavailable("empty output".into()));
    }
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(PipelineError::SourceUnavailable(format!(
            "expected 4 fields, got {}: {:?}",
            fields.len(),
            line
        )));
    }

    let required = |idx: usize, name: &str| -> Result<f64> {
        let raw = fields[idx];
        if raw.is_empty() {
            return Err(PipelineError::SourceUnavailable(format!("empty {} field", name)));
        }
        raw.parse::<f64>().map_err(|_| {
            PipelineError::SourceUnavailable(format!("unparsable {}: {:?}", name, raw))
        })
    };

    let temperature = required(0, "temperature")?;
    let utilization = required(1, "utilization")?;
    let memory_used = required(2, "memory")?;
    let power = fields[3].parse::<f64>().unwrap_or(0.0);

    Ok((temperature, utilization, memory_used, power))
}
