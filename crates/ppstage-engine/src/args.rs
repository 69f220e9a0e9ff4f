//! Argument Marshaling
//!
//! Translates task options into the flat command line understood by a
//! preprocessing engine. The recognized option kinds live in a fixed table
//! that is validated at compile time.

use ppstage_core::TaskOptions;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// Conventional program name placed first in every argument vector
pub const PROGRAM_NAME: &str = "pcpp";

/// Option kinds the marshaler recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Output,
    Defines,
    Includes,
}

/// Declared shape of one option kind
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OptionDescriptor {
    pub kind: OptionKind,
    /// Field the option is stored in
    pub dest: &'static str,
    /// Short flag emitted on the command line
    pub flag: &'static str,
    /// Long spelling accepted by the CLI
    pub long: Option<&'static str>,
    pub metavar: &'static str,
    /// Values carried by each occurrence
    pub arity: usize,
    /// Whether the option may occur more than once
    pub repeatable: bool,
    pub help: &'static str,
}

/// Declared shape of the positional document argument
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PositionalDescriptor {
    pub name: &'static str,
    pub help: &'static str,
}

pub const DATA_ARGUMENT: PositionalDescriptor = PositionalDescriptor {
    name: "data",
    help: "File to preprocess (use '-' for stdin)",
};

pub const OPTION_TABLE: [OptionDescriptor; 3] = [
    OptionDescriptor {
        kind: OptionKind::Output,
        dest: "output",
        flag: "-o",
        long: Some("--output"),
        metavar: "path",
        arity: 1,
        repeatable: false,
        help: "Output to a file instead of stdout",
    },
    OptionDescriptor {
        kind: OptionKind::Defines,
        dest: "defines",
        flag: "-D",
        long: None,
        metavar: "macro[=val]",
        arity: 1,
        repeatable: true,
        help: "Predefine name as a macro [with value]",
    },
    OptionDescriptor {
        kind: OptionKind::Includes,
        dest: "includes",
        flag: "-I",
        long: None,
        metavar: "path",
        arity: 1,
        repeatable: true,
        help: "Path to search for unfound #include's",
    },
];

const fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Every flag starts with `-`, every arity is positive, flags and dests are unique
const fn table_is_valid(table: &[OptionDescriptor]) -> bool {
    let mut i = 0;
    while i < table.len() {
        let flag = table[i].flag.as_bytes();
        if flag.len() < 2 || flag[0] != b'-' || table[i].arity == 0 {
            return false;
        }
        let mut j = i + 1;
        while j < table.len() {
            if bytes_eq(flag, table[j].flag.as_bytes())
                || bytes_eq(table[i].dest.as_bytes(), table[j].dest.as_bytes())
            {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    table_is_valid(&OPTION_TABLE),
    "option table has a malformed or duplicate entry"
);

impl OptionDescriptor {
    /// Look up a descriptor by its short or long flag
    pub fn for_flag(flag: &str) -> Option<&'static OptionDescriptor> {
        OPTION_TABLE
            .iter()
            .find(|d| d.flag == flag || d.long == Some(flag))
    }

    /// Look up the descriptor of an option kind
    pub fn for_kind(kind: OptionKind) -> &'static OptionDescriptor {
        match kind {
            OptionKind::Output => &OPTION_TABLE[0],
            OptionKind::Defines => &OPTION_TABLE[1],
            OptionKind::Includes => &OPTION_TABLE[2],
        }
    }
}

/// One element of an argument vector, as read back by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Program(&'a str),
    Positional(&'a str),
    Option {
        kind: OptionKind,
        flag: &'a str,
        value: &'a str,
        /// Index of the flag token
        at: usize,
    },
}

/// Flat command line handed to an engine
///
/// The first token is always the program name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ArgumentVector {
    tokens: Vec<String>,
}

impl ArgumentVector {
    /// Create a vector holding just the program name
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            tokens: vec![program.into()],
        }
    }

    pub fn push_positional(&mut self, value: impl Into<String>) {
        self.tokens.push(value.into());
    }

    pub fn push_pair(&mut self, flag: &str, value: impl Into<String>) {
        self.tokens.push(flag.to_string());
        self.tokens.push(value.into());
    }

    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Read the vector back as program, positionals and flag-value pairs
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let mut segments = Vec::with_capacity(self.tokens.len());
        let mut iter = self.tokens.iter().enumerate();

        if let Some((_, program)) = iter.next() {
            segments.push(Segment::Program(program));
        }

        while let Some((at, token)) = iter.next() {
            match OptionDescriptor::for_flag(token) {
                Some(descriptor) => match iter.next() {
                    Some((_, value)) => segments.push(Segment::Option {
                        kind: descriptor.kind,
                        flag: token,
                        value,
                        at,
                    }),
                    // trailing flag without a value
                    None => segments.push(Segment::Positional(token)),
                },
                None => segments.push(Segment::Positional(token)),
            }
        }

        segments
    }

    /// The document token
    pub fn input(&self) -> Option<&str> {
        self.segments().into_iter().find_map(|s| match s {
            Segment::Positional(value) => Some(value),
            _ => None,
        })
    }

    /// Values of every pair of the given kind, in order
    pub fn values(&self, kind: OptionKind) -> Vec<&str> {
        self.segments()
            .into_iter()
            .filter_map(|s| match s {
                Segment::Option { kind: k, value, .. } if k == kind => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Value of the output pair, if any
    pub fn output(&self) -> Option<&str> {
        self.values(OptionKind::Output).into_iter().next()
    }

    /// Copy of this vector whose output pair names `path`
    ///
    /// An existing output value is overwritten; otherwise a pair is appended.
    pub fn with_output(&self, path: &Path) -> ArgumentVector {
        let mut rewritten = self.clone();
        let value = path.to_string_lossy().into_owned();

        let positions: Vec<usize> = self
            .segments()
            .into_iter()
            .filter_map(|s| match s {
                Segment::Option {
                    kind: OptionKind::Output,
                    at,
                    ..
                } => Some(at),
                _ => None,
            })
            .collect();

        match positions.split_first() {
            Some((&first, rest)) => {
                rewritten.tokens[first + 1] = value;
                for &at in rest.iter().rev() {
                    rewritten.tokens.drain(at..at + 2);
                }
            }
            None => rewritten.push_pair(OptionDescriptor::for_kind(OptionKind::Output).flag, value),
        }

        rewritten
    }
}

impl fmt::Display for ArgumentVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

/// Where the user asked the output to go, and where the engine actually writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    logical: Option<PathBuf>,
    physical: PathBuf,
}

impl OutputTarget {
    pub fn new(logical: Option<PathBuf>, physical: PathBuf) -> Self {
        Self { logical, physical }
    }

    /// Destination requested by the user
    pub fn logical(&self) -> Option<&Path> {
        self.logical.as_deref()
    }

    /// Adapter-owned file the engine writes to
    pub fn physical(&self) -> &Path {
        &self.physical
    }

    /// Point the vector's output pair at the physical target
    pub fn apply(&self, argv: &ArgumentVector) -> ArgumentVector {
        argv.with_output(&self.physical)
    }
}

/// Values an option kind contributes for the given options
fn option_values(options: &TaskOptions, kind: OptionKind) -> Vec<Cow<'_, str>> {
    match kind {
        OptionKind::Output => options
            .output
            .iter()
            .map(|p| p.to_string_lossy())
            .collect(),
        OptionKind::Defines => options.defines.iter().map(|d| Cow::Borrowed(d.as_str())).collect(),
        OptionKind::Includes => options.includes.iter().map(|i| Cow::Borrowed(i.as_str())).collect(),
    }
}

/// Build the engine argument vector for a set of task options
///
/// Values are passed through unchanged; the engine is responsible for
/// rejecting malformed ones.
pub fn marshal(options: &TaskOptions) -> ArgumentVector {
    let mut argv = ArgumentVector::new(PROGRAM_NAME);
    argv.push_positional(options.input.as_str());

    for descriptor in OPTION_TABLE.iter() {
        let values = option_values(options, descriptor.kind);
        let values = if descriptor.repeatable {
            &values[..]
        } else {
            &values[..values.len().min(1)]
        };

        for value in values {
            argv.push_pair(descriptor.flag, value.as_ref());
        }
    }

    argv
}
