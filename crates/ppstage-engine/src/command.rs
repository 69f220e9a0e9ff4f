//! Command Engine
//!
//! Runs an external preprocessor program (pcpp, cpp or clang) as the
//! engine. The program writes to stdout; its output is streamed line by
//! line into the flushing sink, and its exit status is the return code.

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use ppstage_core::config::EngineConfig;
use ppstage_core::STDIN_SENTINEL;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::args::{ArgumentVector, OptionKind, Segment};
use crate::sink::OutputSink;
use crate::Engine;

/// Errors that can occur while invoking an engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No preprocessor found. Please install pcpp, cpp or clang.")]
    NotFound,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write engine output: {0}")]
    Sink(#[source] io::Error),

    #[error("Invalid argument vector: {0}")]
    InvalidArguments(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Command-line dialect of the preprocessor program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineFlavor {
    Pcpp,
    Cpp,
    Clang,
    Generic,
}

impl EngineFlavor {
    /// Guess the flavor from the program's file name
    pub fn detect(program: &Path) -> Self {
        let stem = program
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();

        if stem.starts_with("pcpp") {
            EngineFlavor::Pcpp
        } else if stem.starts_with("clang") {
            EngineFlavor::Clang
        } else if stem == "cpp" || stem.ends_with("-cpp") {
            EngineFlavor::Cpp
        } else {
            EngineFlavor::Generic
        }
    }

    fn leading_args(&self, reads_stdin: bool) -> Vec<String> {
        match self {
            EngineFlavor::Clang if reads_stdin => {
                vec!["-E".into(), "-x".into(), "c".into()]
            }
            EngineFlavor::Clang => vec!["-E".into()],
            _ => Vec::new(),
        }
    }

    /// Argument that turns off line markers
    fn no_line_markers_arg(&self) -> Option<&'static str> {
        match self {
            // optional-value flag, must come last so it takes no value
            EngineFlavor::Pcpp => Some("--line-directive"),
            EngineFlavor::Cpp | EngineFlavor::Clang => Some("-P"),
            EngineFlavor::Generic => None,
        }
    }
}

/// External preprocessor program wrapper
pub struct CommandEngine {
    /// Path to the preprocessor executable
    program: PathBuf,
    flavor: EngineFlavor,
    /// Arguments placed before the marshaled options
    extra_args: Vec<String>,
    line_markers: bool,
    joined_flags: bool,
}

impl CommandEngine {
    /// Create an engine, auto-detecting an installed preprocessor
    pub fn new() -> Result<Self, EngineError> {
        let program = Self::find_program()?;
        debug!("Found preprocessor at: {:?}", program);
        Ok(Self::with_path(program))
    }

    /// Create an engine with a specific program path
    pub fn with_path(program: PathBuf) -> Self {
        let flavor = EngineFlavor::detect(&program);
        Self {
            program,
            flavor,
            extra_args: Vec::new(),
            line_markers: true,
            joined_flags: false,
        }
    }

    /// Apply engine configuration
    pub fn configured(mut self, config: &EngineConfig) -> Self {
        self.extra_args = config.extra_args.clone();
        self.line_markers = config.line_markers;
        self.joined_flags = config.joined_flags;
        self
    }

    /// Override the detected flavor
    pub fn with_flavor(mut self, flavor: EngineFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn flavor(&self) -> EngineFlavor {
        self.flavor
    }

    /// Find a preprocessor executable
    fn find_program() -> Result<PathBuf, EngineError> {
        let candidates = [
            "pcpp",
            "cpp",
            "clang",
            "/usr/bin/cpp",
            "/usr/bin/clang",
            "/usr/local/bin/clang",
            "/opt/homebrew/bin/clang", // macOS ARM
            "/opt/homebrew/opt/llvm/bin/clang",
        ];

        for candidate in candidates {
            if let Ok(output) = Command::new(candidate).arg("--version").output() {
                if output.status.success() {
                    return Ok(PathBuf::from(candidate));
                }
            }
        }

        Err(EngineError::NotFound)
    }

    /// Build program arguments from a marshaled vector
    ///
    /// The program name and the output pair are dropped: the program writes
    /// to stdout and the engine streams that into the sink.
    fn build_args(&self, argv: &ArgumentVector) -> Result<Vec<String>, EngineError> {
        let input = argv
            .input()
            .ok_or_else(|| EngineError::InvalidArguments(format!("no input document in `{}`", argv)))?;

        let mut args = self.flavor.leading_args(input == STDIN_SENTINEL);
        args.extend(self.extra_args.iter().cloned());

        let mut positionals = Vec::new();
        for segment in argv.segments() {
            match segment {
                Segment::Program(_) => {}
                Segment::Positional(value) => positionals.push(value.to_string()),
                Segment::Option {
                    kind: OptionKind::Output,
                    ..
                } => {}
                Segment::Option { flag, value, .. } => {
                    if self.joined_flags {
                        args.push(format!("{}{}", flag, value));
                    } else {
                        args.push(flag.to_string());
                        args.push(value.to_string());
                    }
                }
            }
        }
        args.extend(positionals);

        if !self.line_markers {
            if let Some(arg) = self.flavor.no_line_markers_arg() {
                args.push(arg.to_string());
            }
        }

        Ok(args)
    }

    /// Stream the child's stdout into the sink, one line per write
    fn pump_stdout(child: &mut Child, sink: &mut dyn OutputSink) -> Result<u64, EngineError> {
        let Some(stdout) = child.stdout.take() else {
            return Ok(0);
        };

        let mut reader = BufReader::new(stdout);
        let mut line = Vec::new();
        let mut lines = 0;
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            sink.write_text(&String::from_utf8_lossy(&line))
                .map_err(EngineError::Sink)?;
            lines += 1;
        }

        Ok(lines)
    }

    /// Parse warnings and errors out of stderr
    fn parse_diagnostics(stderr: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(stderr)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    #[cfg(unix)]
    fn exit_code(status: std::process::ExitStatus) -> i32 {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .or_else(|| status.signal().map(|sig| 128 + sig))
            .unwrap_or(-1)
    }

    #[cfg(not(unix))]
    fn exit_code(status: std::process::ExitStatus) -> i32 {
        status.code().unwrap_or(-1)
    }
}

impl Engine for CommandEngine {
    fn run(&self, argv: &ArgumentVector, sink: &mut dyn OutputSink) -> Result<i32, EngineError> {
        let args = self.build_args(argv)?;
        debug!("Running {:?} with args: {:?}", self.program, args);

        let stdin = if argv.input() == Some(STDIN_SENTINEL) {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        // drained on its own thread so a chatty program cannot block on a full pipe
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        let lines = match Self::pump_stdout(&mut child, sink) {
            Ok(lines) => lines,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        for diagnostic in Self::parse_diagnostics(&stderr) {
            warn!("{}: {}", self.name(), diagnostic);
        }

        let code = Self::exit_code(status);
        info!("{} exited with {} after {} lines", self.name(), code, lines);
        Ok(code)
    }

    fn name(&self) -> &str {
        self.program.to_str().unwrap_or("preprocessor")
    }

    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn version(&self) -> Option<String> {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .ok()
            .and_then(|o| {
                String::from_utf8(o.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }
}
