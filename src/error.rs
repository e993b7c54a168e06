//! Typed errors. Public functions return `anyhow::Result`; these sit underneath for `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

/// Run-level errors: setup failures returned from `Process::start`, and cancellation.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("the collection name can not be empty")]
    EmptyCollectionName,

    #[error("source path does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("error running `{command}`, check that the image tool is correctly installed: {reason}")]
    ToolUnavailable { command: String, reason: String },

    #[error("no image files in folder: {}", .0.display())]
    EmptyCollection(PathBuf),

    #[error("process killed")]
    Killed,
}

/// Item-level errors. Reported as `stderr` messages; never stop the run.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage ran and returned an error.
    #[error("{0}")]
    Failed(String),

    #[error("file {} timed out after {timeout_ms} milliseconds", .path.display())]
    TimedOut { path: PathBuf, timeout_ms: u64 },

    /// The stage panicked with an error value (`panic_any`); the text is kept as-is.
    #[error("{0}")]
    Panicked(String),

    /// Runtime fault or any other panic: the panic message, then the panic-site backtrace.
    #[error("critical error: {trace}")]
    Critical { trace: String },
}

impl StageError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StageError::TimedOut { .. })
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, StageError::Critical { .. })
    }
}

impl From<anyhow::Error> for StageError {
    fn from(e: anyhow::Error) -> Self {
        StageError::Failed(format!("{:#}", e))
    }
}
