// Sample source seam. The production adapter shells out to nvidia-smi;
// tests inject scripted fakes through the trait.

use async_trait::async_trait;

use crate::error::{PipelineError, Result};

/// Metric query fields, in the order the pipeline parses them.
const QUERY_FIELDS: &str = "temperature.gpu,utilization.gpu,memory.used,power.draw";

/// Yields one raw CSV line of `temperature,utilization,memory,power` per
/// invocation, or fails when the device/tool is unavailable.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn query(&self) -> Result<String>;
}

/// Queries an NVIDIA GPU via `nvidia-smi --query-gpu=... --format=csv`.
pub struct NvidiaSmiSource {
    binary: String,
}

impl NvidiaSmiSource {
    pub fn new() -> Self {
        Self {
            binary: "nvidia-smi".into(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for NvidiaSmiSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for NvidiaSmiSource {
    async fn query(&self) -> Result<String> {
        run_query(&self.binary, QUERY_FIELDS).await
    }
}

/// One-shot GPU name discovery for config.json, run at startup.
pub async fn discover_gpu_name(binary: &str) -> Result<String> {
    run_query(binary, "name").await
}

async fn run_query(binary: &str, fields: &str) -> Result<String> {
    let output = tokio::process::Command::new(binary)
        .arg(format!("--query-gpu={}", fields))
        .arg("--format=csv,noheader,nounits")
        .output()
        .await
        .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {}", binary, e)))?;

    if !output.status.success() {
        return Err(PipelineError::SourceUnavailable(format!(
            "{} exited with {}",
            binary, output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().unwrap_or("").trim().to_string();
    if line.is_empty() {
        return Err(PipelineError::SourceUnavailable(format!(
            "{} produced no output",
            binary
        )));
    }
    Ok(line)
}
