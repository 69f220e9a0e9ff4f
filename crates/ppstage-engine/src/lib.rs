//! ppstage Engine
//!
//! The boundary between the task adapter and an external C preprocessor.
//!
//! ## Modules
//!
//! - `args` - Option descriptor table and argument marshaling
//! - `sink` - Output sink with a flush-after-write contract
//! - `command` - Engine backed by an external preprocessor program

pub mod args;
pub mod command;
pub mod sink;

pub use args::{marshal, ArgumentVector, OptionDescriptor, OptionKind, OutputTarget, Segment, OPTION_TABLE};
pub use command::{CommandEngine, EngineError, EngineFlavor};
pub use sink::{FileSink, FlushingSink, OutputSink};

use ppstage_core::config::EngineConfig;

/// A preprocessing engine
///
/// The engine receives a marshaled argument vector whose output pair names
/// the file backing `sink`. It must write its whole result through `sink`
/// and return its status code, zero meaning success.
pub trait Engine: Send + Sync {
    /// Run the engine to completion
    fn run(&self, argv: &ArgumentVector, sink: &mut dyn OutputSink) -> Result<i32, EngineError>;

    /// Get engine name
    fn name(&self) -> &str;

    /// Check if the engine can be invoked
    fn is_available(&self) -> bool;

    /// Engine version string, if it reports one
    fn version(&self) -> Option<String> {
        None
    }
}

/// Get the engine described by the configuration
///
/// Uses the configured program when set, otherwise auto-detects one.
pub fn get_engine(config: &EngineConfig) -> Result<Box<dyn Engine>, EngineError> {
    let engine = match &config.program {
        Some(program) => CommandEngine::with_path(program.clone()),
        None => CommandEngine::new()?,
    };
    Ok(Box::new(engine.configured(config)))
}
