//! Public and internal types for the photobatch API and pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::engine::tools::{file_name_lossy, normalized_name};

/// One input image. Built once during the folder scan and read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFile {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Capture time in seconds since the Unix epoch (or scan time when the date was unreadable).
    pub timestamp: i64,
    /// Date-only key (`YYYYMMDD`) derived from the capture time.
    pub sort_key: String,
    /// Extension for derived outputs, with the leading dot (e.g. `.jpg` for a `.nef` source).
    pub target_ext: String,
}

impl ImageFile {
    /// Output file name: the source stem with the target extension when `remap` is set,
    /// otherwise the original file name.
    pub fn normalized_name(&self, remap: bool) -> String {
        if remap {
            normalized_name(&self.path, &self.target_ext)
        } else {
            file_name_lossy(&self.path)
        }
    }

    /// File name for log and progress lines.
    pub fn display_name(&self) -> String {
        file_name_lossy(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Kind of a [`ProgressMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Stdout,
    Stderr,
    End,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Stdout => "stdout",
            MessageKind::Stderr => "stderr",
            MessageKind::End => "end",
        };
        f.write_str(s)
    }
}

/// Event reported to the caller for one process. Field names on the wire are `Id`, `Kind`, `Body`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProgressMessage {
    pub id: String,
    pub kind: MessageKind,
    pub body: String,
}

impl ProgressMessage {
    pub fn stdout(id: &str, body: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            kind: MessageKind::Stdout,
            body: body.into(),
        }
    }

    pub fn stderr(id: &str, body: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            kind: MessageKind::Stderr,
            body: body.into(),
        }
    }

    /// Terminal message. `body` is empty on success, the error text otherwise.
    pub fn end(id: &str, error: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            kind: MessageKind::End,
            body: error.unwrap_or_default(),
        }
    }

    pub fn is_end(&self) -> bool {
        self.kind == MessageKind::End
    }

    /// One JSON object per message, for relays that forward the stream to a browser.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Lifecycle of a [`Process`](crate::process::Process).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessState {
    Created = 0,
    Running = 1,
    Completed = 2,
    Killed = 3,
    Ended = 4,
}

impl ProcessState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => ProcessState::Created,
            1 => ProcessState::Running,
            2 => ProcessState::Completed,
            3 => ProcessState::Killed,
            _ => ProcessState::Ended,
        }
    }
}

/// How a run finished, as seen by the completion watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item left the pipeline (succeeded or dropped after a per-item error).
    Completed,
    /// The kill broadcast fired before all items were drained.
    Killed,
}
