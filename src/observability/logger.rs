//! Structured JSON line logger.
//!
//! One event per line, written synchronously to stderr with no buffering.
//! Field order is deterministic (event first, then severity, then fields
//! sorted by key) so output is diffable. A process-wide severity gate
//! keeps the library quiet by default.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

/// Log severity levels, ordered from chattiest to gravest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Engine-internal detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recovered or recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Programming errors
    Fatal = 4,
}

impl Severity {
    /// String form used in the log line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            3 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Minimum severity that is actually emitted. A library should stay quiet
/// unless something needs attention, so the default is `Warn`.
static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Warn as u8);

/// Lower or raise the process-wide logging threshold.
pub fn set_min_severity(severity: Severity) {
    MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
}

/// Emits store events as single JSON lines on stderr.
pub struct Logger;

impl Logger {
    /// Log at TRACE level.
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Trace, event, fields);
    }

    /// Log at INFO level.
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Info, event, fields);
    }

    /// Log at WARN level.
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Warn, event, fields);
    }

    /// Log at ERROR level.
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Error, event, fields);
    }

    /// Log at FATAL level.
    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Fatal, event, fields);
    }

    fn emit(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < Severity::from_raw(MIN_SEVERITY.load(Ordering::Relaxed)) {
            return;
        }
        let line = render(severity, event, fields);
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = handle.write_all(line.as_bytes());
        let _ = handle.flush();
    }
}

/// Build one log line, newline included.
fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(128);

    out.push_str("{\"event\":\"");
    escape_into(&mut out, event);
    out.push_str("\",\"severity\":\"");
    out.push_str(severity.as_str());
    out.push('"');

    let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
    sorted.sort_by_key(|(key, _)| *key);

    for (key, value) in sorted {
        out.push_str(",\"");
        escape_into(&mut out, key);
        out.push_str("\":\"");
        escape_into(&mut out, value);
        out.push('"');
    }

    out.push('}');
    out.push('\n');
    out
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
}
