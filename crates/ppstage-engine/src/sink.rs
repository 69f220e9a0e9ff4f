//! Output Sinks
//!
//! Engines write their result through an [`OutputSink`]. Every write is
//! flushed before it returns, so the text is on disk by the time the
//! adapter reads the sink file back.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for engine output
pub trait OutputSink: Send {
    /// Write text and flush it before returning
    fn write_text(&mut self, text: &str) -> io::Result<()>;

    /// Mark the output complete, creating an empty result if nothing was written
    fn finish(&mut self) -> io::Result<()>;

    /// Number of bytes written so far
    fn bytes_written(&self) -> u64;
}

/// Writer wrapper that flushes after every write
pub struct FlushingSink<W: Write> {
    inner: W,
    bytes: u64,
    flushes: u64,
}

impl<W: Write> FlushingSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes: 0,
            flushes: 0,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Number of flushes issued to the inner writer
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }
}

impl<W: Write> Write for FlushingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.inner.flush()?;
        self.bytes += n as u64;
        self.flushes += 1;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        self.inner.flush()
    }
}

impl<W: Write + Send> OutputSink for FlushingSink<W> {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.write_all(text.as_bytes())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.flush()
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

/// File-backed sink
///
/// The file is opened on the first write or on [`OutputSink::finish`], and
/// created only if missing. An engine that fails before writing leaves no
/// file behind, which lets the reader tell "no output" apart from "empty
/// output". Text an engine wrote straight to the path is never truncated.
pub struct FileSink {
    path: PathBuf,
    writer: Option<FlushingSink<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file has been created
    pub fn is_created(&self) -> bool {
        self.writer.is_some()
    }

    fn writer(&mut self) -> io::Result<&mut FlushingSink<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                debug!("Opening sink file {:?}", self.path);
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                FlushingSink::new(file)
            }
        };
        Ok(self.writer.insert(writer))
    }
}

impl OutputSink for FileSink {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.writer()?.write_text(text)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer()?.finish()
    }

    fn bytes_written(&self) -> u64 {
        self.writer.as_ref().map(|w| w.bytes_written()).unwrap_or(0)
    }
}
