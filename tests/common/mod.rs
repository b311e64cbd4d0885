// Shared test helpers
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, Timelike};
use gpumon::error::{PipelineError, Result};
use gpumon::models::MetricSample;
use gpumon::source::SampleSource;

/// One scripted source response.
pub enum ScriptStep {
    Line(String),
    Fail(String),
}

/// Scripted sample source; pops one step per query, fails when exhausted.
pub struct FakeSource {
    script: Mutex<VecDeque<ScriptStep>>,
}

impl FakeSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
        }
    }

    pub fn lines(lines: &[&str]) -> Self {
        Self::new(lines.iter().map(|l| ScriptStep::Line(l.to_string())).collect())
    }
}

#[async_trait]
impl SampleSource for FakeSource {
    async fn query(&self) -> Result<String> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(ScriptStep::Line(l)) => Ok(l),
            Some(ScriptStep::Fail(msg)) => Err(PipelineError::SourceUnavailable(msg)),
            None => Err(PipelineError::SourceUnavailable("script exhausted".into())),
        }
    }
}

/// Now at second precision, the same stamping the sampler does.
pub fn now_secs() -> DateTime<Local> {
    let now = Local::now();
    now.with_nanosecond(0).unwrap_or(now)
}

/// A sample `age_secs` in the past relative to `now`.
pub fn sample_at(now: DateTime<Local>, age_secs: i64, temperature: f64) -> MetricSample {
    MetricSample {
        timestamp: now - Duration::seconds(age_secs),
        temperature,
        utilization: 50.0,
        memory_used: 2048.0,
        power: 120.0,
    }
}

/// Same as `sample_at` with an explicit power value.
pub fn sample_with_power(
    now: DateTime<Local>,
    age_secs: i64,
    temperature: f64,
    power: f64,
) -> MetricSample {
    MetricSample {
        power,
        ..sample_at(now, age_secs, temperature)
    }
}
