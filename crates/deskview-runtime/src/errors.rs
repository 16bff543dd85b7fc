//! Runtime error types

use deskview_core::DeskviewError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] DeskviewError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Runtime channel closed")]
    ChannelClosed,

    #[error("Runtime is not running")]
    NotRunning,

    #[error("Logging setup failed: {reason}")]
    Logging { reason: String },

    #[error("Runtime task failed: {reason}")]
    Task { reason: String },
}

impl RuntimeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
