//! Parallel batch runs using rayon
//!
//! Invokes a task once per document. Each invocation gets its own forward
//! channel, stdout buffer and temporary sink; results come back in input
//! order.

use crate::error::TaskError;
use crate::forward::ForwardChannel;
use crate::outcome::TaskOutcome;
use crate::{Task, TaskContext};
use ppstage_core::TaskOptions;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Result of one document in a batch
pub struct BatchItem {
    pub options: TaskOptions,
    pub result: Result<TaskOutcome, TaskError>,
    pub forwarded: ForwardChannel,
    /// Text the invocation printed
    pub stdout: Vec<u8>,
}

impl BatchItem {
    /// Return code to report for this document
    ///
    /// Failures without an engine return code count as 1.
    pub fn return_code(&self) -> i32 {
        match &self.result {
            Ok(outcome) => outcome.return_code(),
            Err(e) => e.return_code().unwrap_or(1),
        }
    }

    /// Process exit status for this document
    ///
    /// Like [`return_code`](Self::return_code), but a failure is never 0.
    pub fn exit_code(&self) -> i32 {
        match &self.result {
            Ok(outcome) => outcome.return_code(),
            Err(e) => match e.return_code() {
                Some(code) if code != 0 => code,
                _ => 1,
            },
        }
    }
}

/// Runs a task over several documents
pub struct BatchRunner<'t> {
    task: &'t dyn Task,
    jobs: Option<usize>,
}

impl<'t> BatchRunner<'t> {
    pub fn new(task: &'t dyn Task) -> Self {
        Self { task, jobs: None }
    }

    /// Limit the number of worker threads
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs.max(1));
        self
    }

    /// Run one document in isolation
    pub fn run_one(&self, options: &TaskOptions) -> BatchItem {
        let mut forwarded = ForwardChannel::for_task(self.task);
        let mut stdout = Vec::new();
        let result = {
            let mut ctx = TaskContext::new(&mut forwarded, &mut stdout);
            self.task.perform(options, &mut ctx)
        };

        BatchItem {
            options: options.clone(),
            result,
            forwarded,
            stdout,
        }
    }

    /// Run every document, in parallel
    ///
    /// Batches of more than one document may neither share an output file
    /// nor read stdin more than once; such batches are rejected up front.
    pub fn run(&self, documents: &[TaskOptions]) -> Result<Vec<BatchItem>, TaskError> {
        if documents.len() > 1 {
            if let Some(doc) = documents.iter().find(|d| d.output.is_some()) {
                return Err(TaskError::InvalidBatch(format!(
                    "{} sets an output file but the batch has {} documents",
                    doc.input,
                    documents.len()
                )));
            }
            let stdin_readers = documents.iter().filter(|d| d.reads_stdin()).count();
            if stdin_readers > 1 {
                return Err(TaskError::InvalidBatch(format!(
                    "{} documents read stdin, at most one may",
                    stdin_readers
                )));
            }
        }

        let total = documents.len();
        let processed = AtomicUsize::new(0);
        info!("Running {} on {} documents", self.task.info().name, total);

        let run_all = || {
            documents
                .par_iter()
                .map(|options| {
                    let item = self.run_one(options);
                    let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(
                        "Processed {}/{} ({}: rc={})",
                        current,
                        total,
                        options.input,
                        item.return_code()
                    );
                    item
                })
                .collect::<Vec<_>>()
        };

        match self.jobs {
            Some(jobs) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .build()
                    .map_err(|e| TaskError::InvalidBatch(e.to_string()))?;
                Ok(pool.install(run_all))
            }
            None => Ok(run_all()),
        }
    }
}
