//! Leveled, human-readable run logging.
//!
//! Log lines go to standard output by default; an external sink can be
//! installed so embedding code (or tests) can capture the records instead.
//! No machine-readable format is guaranteed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Callback type for external log sinks.
pub type LogSink = Arc<dyn Fn(&LogRecord) + Send + Sync + 'static>;

/// Log severity, ordered from most to least important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// A single log entry, as handed to external sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub category: Option<String>,
}

impl LogRecord {
    fn new(level: LogLevel, message: impl Into<String>, category: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            category: category.map(|c| c.to_string()),
        }
    }
}

fn print_record(record: &LogRecord) {
    let timestamp = record
        .timestamp
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    match &record.category {
        Some(category) => println!(
            "[{}] {:<5} [{}] {}",
            timestamp,
            record.level.label(),
            category,
            record.message
        ),
        None => println!(
            "[{}] {:<5} {}",
            timestamp,
            record.level.label(),
            record.message
        ),
    }
}

/// Logger shared by the orchestrator and its collaborators.
#[derive(Clone)]
pub struct RunLogger {
    min_level: LogLevel,
    sink: Option<LogSink>,
}

impl fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLogger")
            .field("min_level", &self.min_level)
            .field("external_sink", &self.sink.is_some())
            .finish()
    }
}

impl Default for RunLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl RunLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
            sink: None,
        }
    }

    pub fn with_sink(min_level: LogLevel, sink: LogSink) -> Self {
        Self {
            min_level,
            sink: Some(sink),
        }
    }

    pub fn should_log(&self, level: LogLevel) -> bool {
        level <= self.min_level
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, category: Option<&str>) {
        if !self.should_log(level) {
            return;
        }
        let record = LogRecord::new(level, message, category);
        match &self.sink {
            Some(sink) => sink(&record),
            None => print_record(&record),
        }
    }

    pub fn error(&self, message: impl Into<String>, category: Option<&str>) {
        self.log(LogLevel::Error, message, category);
    }

    pub fn warn(&self, message: impl Into<String>, category: Option<&str>) {
        self.log(LogLevel::Warn, message, category);
    }

    pub fn info(&self, message: impl Into<String>, category: Option<&str>) {
        self.log(LogLevel::Info, message, category);
    }

    pub fn debug(&self, message: impl Into<String>, category: Option<&str>) {
        self.log(LogLevel::Debug, message, category);
    }
}
