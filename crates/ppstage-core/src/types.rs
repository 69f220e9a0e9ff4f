//! Core type definitions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Document identifier that stands for standard input
pub const STDIN_SENTINEL: &str = "-";

/// Options for one task run
///
/// `input` is always present. The other fields are optional and contribute
/// nothing to the engine command line when absent or empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Document to preprocess (`-` for stdin)
    pub input: String,
    /// Destination file for the final output (stdout when absent)
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Macro definitions, `NAME` or `NAME=VALUE`, in supplied order
    #[serde(default)]
    pub defines: Vec<String>,
    /// Directories searched for unresolved includes, in supplied order
    #[serde(default)]
    pub includes: Vec<String>,
}

impl TaskOptions {
    /// Create options for a single document
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: None,
            defines: Vec::new(),
            includes: Vec::new(),
        }
    }

    /// Set the destination file
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Append a macro definition
    pub fn define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }

    /// Append an include directory
    pub fn include(mut self, dir: impl Into<String>) -> Self {
        self.includes.push(dir.into());
        self
    }

    /// Whether the document is read from standard input
    pub fn reads_stdin(&self) -> bool {
        self.input == STDIN_SENTINEL
    }

    /// Destination file, if any
    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }
}

/// Full text produced by the engine for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapturedOutput(String);

impl CapturedOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Captured text
    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CapturedOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Engine return code together with the text it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Engine status, zero is success
    pub return_code: i32,
    /// Captured preprocessed text
    pub output: CapturedOutput,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.return_code == 0
    }
}
