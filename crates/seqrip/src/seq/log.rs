//! Conversion log.
//!
//! Problems that only end a single track (unknown opcodes, reads past the
//! end of the dump, runaway loops) are not returned as errors; they are
//! recorded here instead. Every entry is kept on the document, forwarded to
//! an optional injected `LogSink` and emitted as a `tracing` event.
use std::fmt;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Name of the document or track the message is about.
    pub source: String,
    /// Byte offset in the dump, when known.
    pub offset: Option<usize>,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        LogEntry {
            level,
            source: source.into(),
            offset: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(off) => write!(
                f,
                "[{}] {} @0x{:X}: {}",
                self.level, self.source, off, self.message
            ),
            None => write!(f, "[{}] {}: {}", self.level, self.source, self.message),
        }
    }
}

/// Receiver for log entries injected into a `SequenceDocument`.
pub trait LogSink: Send {
    fn record(&mut self, entry: &LogEntry);
}

impl<F> LogSink for F
where
    F: FnMut(&LogEntry) + Send,
{
    fn record(&mut self, entry: &LogEntry) {
        self(entry)
    }
}

/// Entries recorded while converting one document.
#[derive(Default)]
pub struct ConversionLog {
    entries: Vec<LogEntry>,
    sink: Option<Box<dyn LogSink>>,
}

impl fmt::Debug for ConversionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionLog")
            .field("entries", &self.entries)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl ConversionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every future entry to `sink` as well.
    pub fn set_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sink = Some(sink);
    }

    pub fn record(&mut self, entry: LogEntry) {
        let source = entry.source.as_str();
        let offset = entry.offset;
        match entry.level {
            LogLevel::Error => tracing::error!(source, ?offset, "{}", entry.message),
            LogLevel::Warn => tracing::warn!(source, ?offset, "{}", entry.message),
            LogLevel::Info => tracing::info!(source, ?offset, "{}", entry.message),
            LogLevel::Debug => tracing::debug!(source, ?offset, "{}", entry.message),
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.record(&entry);
        }
        self.entries.push(entry);
    }

    /// Record `entry` unless an identical one is already present. Returns
    /// whether it was recorded.
    pub fn record_unique(&mut self, entry: LogEntry) -> bool {
        if self.entries.contains(&entry) {
            return false;
        }
        self.record(entry);
        true
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries at `level` or more severe.
    pub fn at_least(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.level <= level)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
