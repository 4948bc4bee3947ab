//! Worker threads
//!
//! Every task action runs on a dedicated, named thread that the caller joins.
//! Panics and early exits are recovered at the thread boundary and turned
//! into a [`RunResult`]; nothing an action does can unwind into the
//! scheduler.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::context::{AbortSignal, ActionContext};
use crate::middleware::{Input, Runner};
use crate::results::{payload_text, PanicReport, RunResult, Status};
use crate::tasks::Action;

thread_local! {
    static CAPTURE: Cell<bool> = const { Cell::new(false) };
    /// Payload text and backtrace of the last panic seen by the hook.
    static LAST_BACKTRACE: RefCell<Option<(Option<String>, String)>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Install a panic hook that records backtraces on worker threads and stays
/// out of the way everywhere else.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURE.with(Cell::get) {
                let message = payload_text(info.payload());
                let backtrace = Backtrace::force_capture().to_string();
                LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some((message, backtrace)));
            } else {
                previous(info);
            }
        }));
    });
}

/// Forget any backtrace left behind by a panic that was caught and handled.
/// `resume_unwind` bypasses the hook, so a stale trace would otherwise be
/// attributed to the next payload.
pub(crate) fn forget_backtrace() {
    LAST_BACKTRACE.with(|slot| slot.borrow_mut().take());
}

/// Turn an unwind payload into a report. Early exits requested through the
/// context are not panics and yield `None`.
///
/// The recorded backtrace is attached only when it was captured for a
/// payload with the same text.
pub(crate) fn recover(payload: Box<dyn Any + Send>) -> Option<PanicReport> {
    if payload.is::<AbortSignal>() {
        return None;
    }
    let captured = LAST_BACKTRACE.with(|slot| slot.borrow_mut().take());
    match payload.downcast::<PanicReport>() {
        Ok(report) => Some(*report),
        Err(payload) => {
            let value = payload_text(payload.as_ref());
            let backtrace = match captured {
                Some((message, backtrace)) if message == value => backtrace,
                _ => String::new(),
            };
            Some(PanicReport::new(value, backtrace))
        }
    }
}

/// Base runner of the pipeline: run `action` on a fresh worker thread.
///
/// A task without an action reports [`Status::NotRun`].
pub fn action_runner(action: Option<Action>) -> Runner {
    Arc::new(move |input: Input| match &action {
        Some(action) => run_on_worker(action.clone(), input),
        None => RunResult::new(Status::NotRun),
    })
}

fn run_on_worker(action: Action, input: Input) -> RunResult {
    install_panic_hook();

    let start = Instant::now();
    let task = input.task_name.clone();
    let spawned = thread::Builder::new()
        .name(format!("task-{}", task.replace('\0', "")))
        .spawn(move || run_action(&action, input));

    let mut result = match spawned {
        Ok(worker) => worker.join().unwrap_or_else(|payload| RunResult {
            status: Status::Failed,
            panic: recover(payload),
            duration: Duration::ZERO,
        }),
        Err(err) => {
            warn!(task = %task, error = %err, "failed to spawn worker thread");
            RunResult::new(Status::Failed)
        }
    };
    result.duration = start.elapsed();
    result
}

fn run_action(action: &Action, input: Input) -> RunResult {
    CAPTURE.with(|capture| capture.set(true));
    let ctx = ActionContext::new(input.task_name, input.cancel, input.output);
    debug!(task = %ctx.name(), "action started");

    forget_backtrace();
    let action_panic = match panic::catch_unwind(AssertUnwindSafe(|| action(&ctx))) {
        Ok(()) => None,
        Err(payload) => recover(payload),
    };
    let cleanup_panic = ctx.run_cleanups();
    let panic = action_panic.or(cleanup_panic);

    let status = if panic.is_some() || ctx.failed() {
        Status::Failed
    } else if ctx.skipped() {
        Status::Skipped
    } else {
        Status::Passed
    };
    debug!(task = %ctx.name(), %status, "action finished");

    RunResult {
        status,
        panic,
        duration: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Output, SharedBuffer};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn run<F>(action: F) -> (RunResult, SharedBuffer)
    where
        F: Fn(&ActionContext) + Send + Sync + 'static,
    {
        let buffer = SharedBuffer::new();
        let input = Input {
            task_name: "worker-test".to_string(),
            parallel: false,
            cancel: CancellationToken::new(),
            output: buffer.clone().into(),
            messages: Output::discard(),
        };
        let action: Action = Arc::new(action);
        (action_runner(Some(action))(input), buffer)
    }

    #[test]
    fn test_no_action_is_not_run() {
        let input = Input {
            task_name: "empty".to_string(),
            parallel: false,
            cancel: CancellationToken::new(),
            output: Output::discard(),
            messages: Output::discard(),
        };
        assert_eq!(action_runner(None)(input).status, Status::NotRun);
    }

    #[test]
    fn test_statuses() {
        assert_eq!(run(|_| {}).0.status, Status::Passed);
        assert_eq!(run(|ctx| ctx.error("bad")).0.status, Status::Failed);
        assert_eq!(run(|ctx| ctx.skip("not today")).0.status, Status::Skipped);

        let (result, _) = run(|ctx| {
            ctx.skip_now();
        });
        assert_eq!(result.status, Status::Skipped);
        assert!(result.panic.is_none());
    }

    #[test]
    fn test_fail_now_stops_the_action() {
        let (result, buffer) = run(|ctx| {
            ctx.log("before");
            ctx.fail_now();
        });

        assert_eq!(result.status, Status::Failed);
        assert!(result.panic.is_none());
        assert!(buffer.contents_lossy().contains("before"));
    }

    #[test]
    fn test_runs_on_named_worker_thread() {
        let caller = thread::current().id();
        let seen = Arc::new(Mutex::new(None));
        let observed = seen.clone();

        run(move |_| {
            let current = thread::current();
            *observed.lock().unwrap() = Some((current.id(), current.name().map(String::from)));
        });

        let (id, name) = seen.lock().unwrap().clone().unwrap();
        assert_ne!(id, caller);
        assert_eq!(name.as_deref(), Some("task-worker-test"));
    }

    #[test]
    fn test_panic_is_recovered_with_backtrace() {
        let (result, _) = run(|_| panic!("kaboom"));

        assert_eq!(result.status, Status::Failed);
        let report = result.panic.unwrap();
        assert_eq!(report.value.as_deref(), Some("kaboom"));
        assert!(!report.backtrace.is_empty());
    }

    #[test]
    fn test_non_string_payload() {
        let (result, _) = run(|_| panic::resume_unwind(Box::new(7_u8)));

        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.panic.unwrap().value, None);
    }

    #[test]
    fn test_cleanups_run_lifo_after_panics() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let log = order.clone();
        let (result, _) = run(move |ctx| {
            for id in 1..=3 {
                let log = log.clone();
                ctx.cleanup(move || {
                    log.lock().unwrap().push(id);
                    if id == 3 {
                        panic!("cleanup 3");
                    }
                });
            }
            panic!("action");
        });

        assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.panic.unwrap().value.as_deref(), Some("action"));
    }

    #[test]
    fn test_first_cleanup_panic_is_retained() {
        let (result, _) = run(|ctx| {
            ctx.cleanup(|| panic!("cleanup 1"));
            ctx.cleanup(|| panic!("cleanup 2"));
        });

        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.panic.unwrap().value.as_deref(), Some("cleanup 2"));
    }

    #[test]
    fn test_cleanups_run_after_fail_now() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let (result, _) = run(move |ctx| {
            let flag = flag.clone();
            ctx.cleanup(move || *flag.lock().unwrap() = true);
            ctx.fail_now();
        });

        assert!(*ran.lock().unwrap());
        assert_eq!(result.status, Status::Failed);
    }

    #[test]
    fn test_derived_abort_marks_parent() {
        let parent_state = Arc::new(Mutex::new((false, false)));
        let state = parent_state.clone();
        let (result, _) = run(move |ctx| {
            let state = state.clone();
            let parent = ctx.clone();
            ctx.cleanup(move || *state.lock().unwrap() = (parent.failed(), parent.skipped()));
            let derived = ctx.with_cancellation(CancellationToken::new());
            derived.fail_now();
        });

        assert_eq!(result.status, Status::Failed);
        assert_eq!(*parent_state.lock().unwrap(), (true, false));
    }

    #[test]
    fn test_derived_cleanup_panic_surfaces() {
        let (result, _) = run(|ctx| {
            let derived = ctx.with_cancellation(CancellationToken::new());
            derived.cleanup(|| panic!("derived cleanup"));
        });

        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.panic.unwrap().value.as_deref(), Some("derived cleanup"));
    }

    #[test]
    fn test_fail_from_spawned_thread() {
        let (result, _) = run(|ctx| {
            let shared = ctx.clone();
            thread::spawn(move || shared.fail()).join().unwrap();
        });
        assert_eq!(result.status, Status::Failed);
    }

    #[test]
    fn test_fail_now_from_spawned_thread_stops_only_that_thread() {
        let helper_ended = Arc::new(Mutex::new(None));
        let ended = helper_ended.clone();
        let (result, buffer) = run(move |ctx| {
            let shared = ctx.clone();
            let joined = thread::spawn(move || {
                shared.fail_now();
            })
            .join();
            *ended.lock().unwrap() = Some(joined.is_err());
            ctx.log("still running");
        });

        assert_eq!(*helper_ended.lock().unwrap(), Some(true));
        assert!(buffer.contents_lossy().contains("still running"));
        assert_eq!(result.status, Status::Failed);
        assert!(result.panic.is_none());
    }

    #[test]
    fn test_handled_panic_backtrace_is_not_reused() {
        let (result, _) = run(|_| {
            let handled = panic::catch_unwind(|| panic!("handled"));
            if let Err(payload) = handled {
                drop(payload);
                panic::resume_unwind(Box::new("rethrown"));
            }
        });

        let report = result.panic.unwrap();
        assert_eq!(report.value.as_deref(), Some("rethrown"));
        assert!(report.backtrace.is_empty(), "stale trace: {}", report.backtrace);
    }

    #[test]
    fn test_cleanup_panic_keeps_its_own_backtrace() {
        let (result, _) = run(|ctx| {
            ctx.cleanup(|| panic::resume_unwind(Box::new("second")));
            ctx.cleanup(|| panic!("first"));
        });

        let report = result.panic.unwrap();
        assert_eq!(report.value.as_deref(), Some("first"));
        assert!(!report.backtrace.is_empty());
    }

    #[test]
    fn test_duration_is_measured() {
        let (result, _) = run(|_| thread::sleep(Duration::from_millis(20)));
        assert!(result.duration >= Duration::from_millis(20));
    }
}
