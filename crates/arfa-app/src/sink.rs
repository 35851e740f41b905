//! JSON Lines output for classified entries.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use arfa_core::ClassifiedLogEntry;
use arfa_proxy::{LogSink, RawEvent, TracingSink};
use parking_lot::Mutex;

/// Sink writing one classified entry per line.
///
/// Raw events go to `tracing` only.
pub struct JsonlSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink").finish_non_exhaustive()
    }
}

impl JsonlSink {
    /// Creates a sink writing to `writer`.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Creates a sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Creates a sink appending to `path`, creating parent directories.
    pub fn append_to(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }

    fn write_line(&self, entry: &ClassifiedLogEntry) -> anyhow::Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl LogSink for JsonlSink {
    fn log_event(&self, event: RawEvent) {
        TracingSink.log_event(event);
    }

    fn log_classified(&self, entry: ClassifiedLogEntry) {
        if let Err(e) = self.write_line(&entry) {
            tracing::warn!("Failed to write log entry {}: {:#}", entry.id, e);
        }
    }
}
