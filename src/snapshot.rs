// Current-sample publisher. Bypasses the buffer and log so the frontend
// sees the freshest reading regardless of flush cadence.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{CurrentSnapshot, MetricSample};
use crate::persist;

pub const SNAPSHOT_FILE_NAME: &str = "current.json";

pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SNAPSHOT_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replaces the snapshot file with the given sample.
    pub fn publish(&self, sample: &MetricSample) -> Result<()> {
        persist::write_json_atomic(&self.path, &CurrentSnapshot::from(sample))
    }
}
