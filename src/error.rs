// Error taxonomy for the pipeline. Recoverable kinds are handled at the
// worker loop; only startup directory failures are fatal.

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The sample source produced no output or output that cannot form a
    /// complete sample. Transient; retried by the worker.
    #[error("sample source unavailable: {0}")]
    SourceUnavailable(String),

    /// A persisted line/record failed to parse during aggregation.
    /// Recovered locally by skipping the record.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// A persisted document was unreadable or invalid; the caller resets
    /// to an empty default.
    #[error("corrupt persisted state at {path}: {detail}")]
    CorruptState { path: String, detail: String },

    /// Temp-file write, rename, or append failed. The previous valid file
    /// is left in place.
    #[error("write failure at {path}: {source}")]
    WriteFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Output directory is missing or not writable.
    #[error("directory unwritable: {path}: {detail}")]
    DirectoryUnwritable { path: String, detail: String },
}

impl PipelineError {
    pub fn write_failure(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
