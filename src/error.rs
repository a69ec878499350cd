//! Crate-wide error type

use std::io;
use std::path::PathBuf;

/// Failures surfaced to callers of the line editor
#[derive(Debug, thiserror::Error)]
pub enum MleError {
    #[error("terminal I/O failed: {0}")]
    Tty(#[from] io::Error),

    #[error("history file {path}: {source}")]
    History {
        path: PathBuf,
        source: io::Error,
    },

    #[error("binding {spec:?}: {reason}")]
    Binding { spec: String, reason: String },
}
