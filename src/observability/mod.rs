//! # Observability
//!
//! Structured logging for store events. Events are emitted on the write
//! and recovery paths only; the read path stays silent.

mod logger;

pub use logger::{set_min_severity, Logger, Severity};
