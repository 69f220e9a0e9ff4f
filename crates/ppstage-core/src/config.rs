//! Configuration types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// ppstage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine configuration
    pub engine: EngineConfig,

    /// Task configuration
    pub task: TaskConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a YAML or JSON file, chosen by extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(Error::Config(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Preprocessor executable (auto-detected when absent)
    pub program: Option<PathBuf>,

    /// Arguments placed before the marshaled options
    pub extra_args: Vec<String>,

    /// Emit line markers in the output
    pub line_markers: bool,

    /// Pass `-DNAME` instead of `-D NAME` to the program
    pub joined_flags: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: None,
            extra_args: Vec::new(),
            line_markers: true,
            joined_flags: false,
        }
    }
}

/// Task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Directory under which temporary sinks are created (system temp dir when absent)
    pub temp_root: Option<PathBuf>,

    /// File name of the engine output inside each sink directory
    pub sink_file_name: String,

    /// Field name the preprocessed text is forwarded under
    pub forward_field: String,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            temp_root: None,
            sink_file_name: "output.i".into(),
            forward_field: "data".into(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}
