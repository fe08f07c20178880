use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("structure error on line {line} (byte {offset}): {message}")]
    Structure {
        line: usize,
        offset: usize,
        message: String,
    },
    #[error(
        "generated piece {index} starts at byte {start} before the previous piece ends at byte {previous_end}"
    )]
    InvariantViolation {
        index: usize,
        previous_end: usize,
        start: usize,
    },
    #[error("external compiler failed: {0}")]
    ExternalProcess(ProcessFailure),
    #[error(
        "could not find the `{binary}` compiler binary (searched {}); install it or add it to PATH",
        display_paths(.searched)
    )]
    BinaryNotFound { binary: String, searched: Vec<PathBuf> },
    #[error("malformed compiler output: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessFailure {
    #[error("timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
}

impl CoreError {
    pub fn structure(line: usize, offset: usize, message: impl Into<String>) -> Self {
        CoreError::Structure {
            line,
            offset,
            message: message.into(),
        }
    }

    /// Errors caused by the template text itself, as opposed to the
    /// environment or a generator defect.
    pub fn is_input_error(&self) -> bool {
        matches!(self, CoreError::Structure { .. })
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "PATH".to_string();
    }
    let mut listed: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    listed.push("PATH".to_string());
    listed.join(", ")
}
