//! pcpp Task
//!
//! Wraps a C preprocessor so it can run as a pipeline stage. The task
//! marshals its options, points the engine at a scoped temporary sink,
//! reads the result back, then prints it or moves it to the requested
//! file and forwards it downstream.
//!
//! ```text
//! ppstage run my.f90 -D XVAL=1 -D YVAL=1 -o pcpp_my.f90
//! ```

use std::path::Path;
use std::sync::Arc;

use ppstage_core::config::TaskConfig;
use ppstage_core::{CapturedOutput, RunResult, TaskOptions};
use ppstage_engine::sink::FileSink;
use ppstage_engine::{marshal, ArgumentVector, Engine, OutputSink, OutputTarget};
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::forward::ForwardDecl;
use crate::outcome::{Disposition, TaskOutcome};
use crate::scoped::ScopedTempSink;
use crate::{Task, TaskContext, TaskInfo};

pub const TASK_NAME: &str = "pcpp";
pub const TASK_VERSION: &str = "0.1.0";

/// Description of the forwarded field
pub const FORWARD_HELP: &str = "preprocessed source code";

pub const INFO: TaskInfo = TaskInfo {
    name: TASK_NAME,
    version: TASK_VERSION,
    about: "a wrapper task for a C99 preprocessor",
    example: "ppstage run my.f90 -D XVAL=1 -D YVAL=1 -o pcpp_my.f90",
};

/// Capture-and-forward task around a preprocessing engine
pub struct PcppTask {
    engine: Arc<dyn Engine>,
    settings: TaskConfig,
}

impl PcppTask {
    /// Create a task with default settings
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            settings: TaskConfig::default(),
        }
    }

    pub fn with_settings(mut self, settings: TaskConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Name the preprocessed text is forwarded under
    pub fn forward_field(&self) -> &str {
        &self.settings.forward_field
    }

    /// Run the engine against the physical target
    ///
    /// A successful run with no output still leaves an (empty) file; a
    /// failing run that wrote nothing leaves none.
    fn invoke(&self, argv: &ArgumentVector, physical: &Path) -> Result<i32, TaskError> {
        let mut sink = FileSink::new(physical);
        let return_code = self.engine.run(argv, &mut sink)?;

        if return_code == 0 {
            sink.finish().map_err(|source| TaskError::Capture {
                path: physical.to_path_buf(),
                return_code,
                source,
            })?;
        }
        debug!(
            "{} returned {} after writing {} bytes",
            self.engine.name(),
            return_code,
            sink.bytes_written()
        );

        Ok(return_code)
    }

    /// Print the captured text or move it to the requested file
    fn dispose(
        &self,
        sink: &ScopedTempSink,
        target: &OutputTarget,
        output: &CapturedOutput,
        return_code: i32,
        ctx: &mut TaskContext<'_>,
    ) -> Result<Disposition, TaskError> {
        match target.logical() {
            Some(dest) => sink
                .relocate_to(dest)
                .map(|()| Disposition::Written(dest.to_path_buf()))
                .map_err(|source| TaskError::Relocation {
                    path: dest.to_path_buf(),
                    return_code,
                    source,
                }),
            None => ctx
                .stdout
                .write_all(output.text().as_bytes())
                .and_then(|()| ctx.stdout.flush())
                .map(|()| Disposition::Printed)
                .map_err(|source| TaskError::Print {
                    return_code,
                    source,
                }),
        }
    }
}

impl Task for PcppTask {
    fn info(&self) -> TaskInfo {
        INFO
    }

    fn forwards(&self) -> Vec<ForwardDecl> {
        vec![ForwardDecl::new(self.settings.forward_field.clone(), FORWARD_HELP)]
    }

    fn perform(
        &self,
        options: &TaskOptions,
        ctx: &mut TaskContext<'_>,
    ) -> Result<TaskOutcome, TaskError> {
        let argv = marshal(options);

        // removed on drop, so every `?` below releases it too
        let sink = ScopedTempSink::acquire(
            self.settings.temp_root.as_deref(),
            &self.settings.sink_file_name,
        )
        .map_err(TaskError::Sink)?;

        let target = OutputTarget::new(options.output.clone(), sink.file_path().to_path_buf());
        let argv = target.apply(&argv);
        debug!("Invoking {} with `{}`", self.engine.name(), argv);

        let return_code = self.invoke(&argv, target.physical())?;
        if return_code != 0 {
            warn!(
                "{} reported {} for {}",
                self.engine.name(),
                return_code,
                options.input
            );
        }

        let output = sink.read_captured().map_err(|source| TaskError::Capture {
            path: sink.file_path().to_path_buf(),
            return_code,
            source,
        })?;

        let disposition = self.dispose(&sink, &target, &output, return_code, ctx);
        let forwarded = ctx
            .forward
            .forward(&self.settings.forward_field, output.text());

        let sink_id = sink.id().to_string();
        let cleanup = sink.release();
        // a failed print or move outranks a forwarding error
        let disposition = disposition?;
        forwarded?;

        info!(
            "Preprocessed {} ({} bytes, rc={})",
            options.input,
            output.len(),
            return_code
        );

        Ok(TaskOutcome {
            run: RunResult {
                return_code,
                output,
            },
            disposition,
            sink_id,
            cleanup,
        })
    }
}
