//! Task error types

use ppstage_engine::EngineError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a task invocation
///
/// Engine failures that still produce a return code are not errors; they
/// are reported through the outcome's return code.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Failed to set up temporary sink: {0}")]
    Sink(#[source] io::Error),

    #[error("Engine could not be invoked: {0}")]
    Engine(#[from] EngineError),

    #[error("Failed to capture engine output from {path:?}: {source}")]
    Capture {
        path: PathBuf,
        return_code: i32,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write output to {path:?}: {source}")]
    Relocation {
        path: PathBuf,
        return_code: i32,
        #[source]
        source: io::Error,
    },

    #[error("Failed to print output: {source}")]
    Print {
        return_code: i32,
        #[source]
        source: io::Error,
    },

    #[error("Undeclared forward field: {0}")]
    Forward(String),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),
}

impl TaskError {
    /// Engine return code, when the engine got far enough to report one
    pub fn return_code(&self) -> Option<i32> {
        match self {
            TaskError::Capture { return_code, .. }
            | TaskError::Relocation { return_code, .. }
            | TaskError::Print { return_code, .. } => Some(*return_code),
            _ => None,
        }
    }

    /// Short failure category name
    pub fn category(&self) -> &'static str {
        match self {
            TaskError::Sink(_) => "sink",
            TaskError::Engine(_) => "engine",
            TaskError::Capture { .. } => "capture",
            TaskError::Relocation { .. } | TaskError::Print { .. } => "relocation",
            TaskError::Forward(_) => "forward",
            TaskError::InvalidBatch(_) => "batch",
        }
    }
}
