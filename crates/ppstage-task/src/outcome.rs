//! Task outcome types

use crate::scoped::CleanupStatus;
use ppstage_core::{CapturedOutput, RunResult};
use serde::Serialize;
use std::path::PathBuf;

/// Where the captured text ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Printed to standard output
    Printed,
    /// Moved to the requested output file
    Written(PathBuf),
}

/// Report of a completed invocation
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    /// Engine return code and captured text
    pub run: RunResult,
    pub disposition: Disposition,
    /// Identifier of the temporary sink used
    pub sink_id: String,
    pub cleanup: CleanupStatus,
}

impl TaskOutcome {
    pub fn return_code(&self) -> i32 {
        self.run.return_code
    }

    pub fn output(&self) -> &CapturedOutput {
        &self.run.output
    }
}
