//! Action context
//!
//! Every task run gets a fresh [`ActionContext`]. It is the action's only
//! handle on the engine: it writes to the task output, records failure and
//! skip state, exposes the cancellation token, and collects cleanup handlers
//! that run in LIFO order once the action body ends, however it ends.
//!
//! `fail_now`, `skip_now`, `fatal` and `skip` end the action by unwinding the
//! calling thread with a private payload that the worker recognises. They are
//! only meaningful on the task's own worker thread; called from a thread the
//! action spawned they unwind that thread instead and leave the action
//! running.

use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe, Location};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::execution::worker::{forget_backtrace, recover};
use crate::output::Output;
use crate::results::PanicReport;

/// Unwind payload used to end an action early.
pub(crate) struct AbortSignal;

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Flags {
    failed: bool,
    skipped: bool,
}

struct ContextState {
    flags: Mutex<Flags>,
    cleanups: Mutex<Vec<Cleanup>>,
    parent: Option<Arc<ContextState>>,
}

impl ContextState {
    fn new(parent: Option<Arc<ContextState>>) -> Arc<Self> {
        Arc::new(Self {
            flags: Mutex::new(Flags::default()),
            cleanups: Mutex::new(Vec::new()),
            parent,
        })
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_failed(&self) {
        self.flags().failed = true;
        if let Some(parent) = &self.parent {
            parent.mark_failed();
        }
    }

    fn mark_skipped(&self) {
        self.flags().skipped = true;
        if let Some(parent) = &self.parent {
            parent.mark_skipped();
        }
    }

    fn push_cleanup(&self, cleanup: Cleanup) {
        self.cleanups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cleanup);
    }

    fn pop_cleanup(&self) -> Option<Cleanup> {
        self.cleanups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    /// Run every registered cleanup, newest first, each under its own panic
    /// guard. Cleanups registered while cleaning up run as well. Returns the
    /// first panic encountered.
    fn run_cleanups(&self) -> Option<PanicReport> {
        let mut first = None;
        while let Some(cleanup) = self.pop_cleanup() {
            forget_backtrace();
            let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) else {
                continue;
            };
            if let Some(report) = recover(payload) {
                self.mark_failed();
                first.get_or_insert(report);
            }
        }
        first
    }
}

/// Per-run handle given to a task action.
#[derive(Clone)]
pub struct ActionContext {
    name: String,
    cancel: CancellationToken,
    output: Output,
    state: Arc<ContextState>,
    worker: ThreadId,
}

impl ActionContext {
    /// Create a context bound to the calling thread.
    pub(crate) fn new(name: impl Into<String>, cancel: CancellationToken, output: Output) -> Self {
        Self {
            name: name.into(),
            cancel,
            output,
            state: ContextState::new(None),
            worker: thread::current().id(),
        }
    }

    /// Name of the running task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task output. Anything written here is subject to the same
    /// buffering as log lines.
    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write a line to the task output, prefixed with the caller's location.
    #[track_caller]
    pub fn log(&self, message: impl fmt::Display) {
        self.write_log(Location::caller(), &message.to_string());
    }

    /// Log and mark the task as failed. Execution continues.
    #[track_caller]
    pub fn error(&self, message: impl fmt::Display) {
        self.write_log(Location::caller(), &message.to_string());
        self.fail();
    }

    /// Log, mark the task as failed and stop the action.
    #[track_caller]
    pub fn fatal(&self, message: impl fmt::Display) -> ! {
        self.write_log(Location::caller(), &message.to_string());
        self.fail_now()
    }

    /// Log, mark the task as skipped and stop the action.
    #[track_caller]
    pub fn skip(&self, message: impl fmt::Display) -> ! {
        self.write_log(Location::caller(), &message.to_string());
        self.skip_now()
    }

    /// Mark the task as failed without stopping it. Safe from any thread.
    pub fn fail(&self) {
        self.state.mark_failed();
    }

    pub fn failed(&self) -> bool {
        self.state.flags().failed
    }

    pub fn skipped(&self) -> bool {
        self.state.flags().skipped
    }

    /// Mark the task as failed and stop the action. Registered cleanups
    /// still run.
    pub fn fail_now(&self) -> ! {
        self.state.mark_failed();
        self.exit()
    }

    /// Mark the task as skipped and stop the action. Registered cleanups
    /// still run.
    pub fn skip_now(&self) -> ! {
        self.state.mark_skipped();
        self.exit()
    }

    /// Register a function to run after the action ends. Cleanups run in
    /// reverse registration order.
    pub fn cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.push_cleanup(Box::new(cleanup));
    }

    /// Derive a context bound to another cancellation token.
    ///
    /// The derived context shares the output, reports failure and skip to
    /// this context, and keeps its own cleanup stack. That stack runs at the
    /// position this call occupies in the parent's cleanup order.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> ActionContext {
        let state = ContextState::new(Some(self.state.clone()));
        let derived = state.clone();
        self.cleanup(move || {
            if let Some(report) = derived.run_cleanups() {
                panic::resume_unwind(Box::new(report));
            }
        });

        ActionContext {
            name: self.name.clone(),
            cancel,
            output: self.output.clone(),
            state,
            worker: self.worker,
        }
    }

    /// Set an environment variable for the rest of the run. The previous
    /// value is restored (or the variable removed) during cleanup.
    ///
    /// The process environment is shared, so parallel tasks must not set the
    /// same variable.
    #[track_caller]
    pub fn set_env(&self, key: &str, value: impl AsRef<OsStr>) {
        let value = value.as_ref();
        let invalid_key = key.is_empty() || key.contains(|c| c == '=' || c == '\0');
        if invalid_key || value.as_encoded_bytes().contains(&0) {
            self.fatal(format!(
                "cannot set environment variable {key:?}: invalid name or value"
            ));
        }

        let previous = env::var_os(key);
        env::set_var(key, value);

        let key = key.to_string();
        self.cleanup(move || match previous {
            Some(previous) => env::set_var(&key, previous),
            None => env::remove_var(&key),
        });
    }

    /// Create a temporary directory that is removed once the run ends.
    #[track_caller]
    pub fn temp_dir(&self) -> PathBuf {
        let prefix = format!("{}-", sanitize_name(&self.name));
        let dir = match tempfile::Builder::new().prefix(&prefix).tempdir() {
            Ok(dir) => dir,
            Err(err) => self.fatal(format!("cannot create temporary directory: {err}")),
        };

        let path = dir.path().to_path_buf();
        let ctx = self.clone();
        self.cleanup(move || {
            let location = dir.path().display().to_string();
            if let Err(err) = dir.close() {
                ctx.error(format!("cannot remove temporary directory {location}: {err}"));
            }
        });
        path
    }

    pub(crate) fn run_cleanups(&self) -> Option<PanicReport> {
        self.state.run_cleanups()
    }

    fn exit(&self) -> ! {
        if thread::current().id() != self.worker {
            warn!(
                task = %self.name,
                "abort requested outside the task worker thread; only the calling thread stops"
            );
        }
        panic::resume_unwind(Box::new(AbortSignal))
    }

    fn write_log(&self, location: &Location<'_>, message: &str) {
        let file = Path::new(location.file())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| location.file().to_string());
        let body = message.trim_end_matches('\n').replace('\n', "\n        ");
        let mut out = self.output.clone();
        if let Err(err) = writeln!(out, "      {}:{}: {}", file, location.line(), body) {
            warn!(task = %self.name, error = %err, "failed to write task log");
        }
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("name", &self.name)
            .field("failed", &self.failed())
            .field("skipped", &self.skipped())
            .finish_non_exhaustive()
    }
}

/// Turn a task name into something usable as a file name prefix.
fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .take(64)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "task".to_string()
    } else {
        sanitized
    }
}
