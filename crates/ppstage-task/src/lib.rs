//! ppstage Task
//!
//! The pipeline-facing side of ppstage: a uniform [`Task`] interface, the
//! `pcpp` capture-and-forward task, and the pieces it is built from.
//!
//! ## Modules
//!
//! - `pcpp` - Runs the engine, captures its output and forwards it
//! - `scoped` - Temporary sink directory removed on every exit path
//! - `forward` - Declared fields handed to downstream tasks
//! - `batch` - One invocation per document, in parallel
//! - `outcome` - What a successful invocation reports

pub mod batch;
pub mod error;
pub mod forward;
pub mod outcome;
pub mod pcpp;
pub mod scoped;

pub use batch::{BatchItem, BatchRunner};
pub use error::TaskError;
pub use forward::{ForwardChannel, ForwardDecl};
pub use outcome::{Disposition, TaskOutcome};
pub use pcpp::PcppTask;
pub use scoped::{CleanupStatus, ScopedTempSink};

use ppstage_core::TaskOptions;
use ppstage_engine::{OptionDescriptor, OPTION_TABLE};
use serde::Serialize;
use std::io::Write;

/// Task metadata shown to users and pipeline hosts
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub about: &'static str,
    /// Example command line
    pub example: &'static str,
}

/// Where a task sends its results
pub struct TaskContext<'a> {
    /// Forwarded data for downstream tasks
    pub forward: &'a mut ForwardChannel,
    /// Standard output stream
    pub stdout: &'a mut dyn Write,
}

impl<'a> TaskContext<'a> {
    pub fn new(forward: &'a mut ForwardChannel, stdout: &'a mut dyn Write) -> Self {
        Self { forward, stdout }
    }
}

/// A task a pipeline host can invoke once per document
pub trait Task: Send + Sync {
    /// Task metadata
    fn info(&self) -> TaskInfo;

    /// Options the task accepts
    fn options(&self) -> &'static [OptionDescriptor] {
        &OPTION_TABLE
    }

    /// Fields the task forwards
    fn forwards(&self) -> Vec<ForwardDecl>;

    /// Process one document
    fn perform(
        &self,
        options: &TaskOptions,
        ctx: &mut TaskContext<'_>,
    ) -> Result<TaskOutcome, TaskError>;
}
