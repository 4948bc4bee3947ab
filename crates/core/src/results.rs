//! Result types for task runs
//!
//! This module contains the values produced by running a single task, shared
//! by the action runtime, the middlewares and the scheduler.

use std::any::Any;
use std::fmt;
use std::time::Duration;

/// Outcome of a single task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// The action never started: no action, explicit skip, upstream failure
    /// or cancellation.
    #[default]
    NotRun,
    Passed,
    Failed,
    Skipped,
}

impl Status {
    /// Short label used by the status report.
    pub fn label(&self) -> &'static str {
        match self {
            Status::NotRun => "NOOP",
            Status::Passed => "PASS",
            Status::Failed => "FAIL",
            Status::Skipped => "SKIP",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A panic recovered at the worker boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicReport {
    /// Rendered payload. `None` when the payload was not a string or the
    /// worker unwound without recording a failure.
    pub value: Option<String>,
    pub backtrace: String,
}

impl PanicReport {
    pub fn new(value: Option<String>, backtrace: impl Into<String>) -> Self {
        Self {
            value,
            backtrace: backtrace.into(),
        }
    }

    /// Build a report from a raw unwind payload.
    pub fn from_payload(payload: &(dyn Any + Send), backtrace: impl Into<String>) -> Self {
        Self::new(payload_text(payload), backtrace)
    }
}

/// Text of a `&str` or `String` panic payload.
pub fn payload_text(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        Some((*text).to_string())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "panic: {value}"),
            None => f.write_str("panic: <no printable payload>"),
        }
    }
}

/// Result of running one task through the runner pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunResult {
    pub status: Status,
    pub panic: Option<PanicReport>,
    pub duration: Duration,
}

impl RunResult {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn failed(&self) -> bool {
        self.status == Status::Failed
    }
}
