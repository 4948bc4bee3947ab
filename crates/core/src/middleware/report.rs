//! Reporting middlewares
//!
//! Status banners around each task, periodic notices for long-running tasks,
//! and the overall pass/fail summary of a flow execution.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick};

use crate::middleware::{ExecuteInput, Executor, Input, Runner};

/// Report task start, end status, duration and any recovered panic.
///
/// ```text
/// ===== TASK  build
/// ----- PASS: build (0.12s)
/// ```
pub fn report_status(next: Runner) -> Runner {
    Arc::new(move |input: Input| {
        let messages = input.messages.clone();
        let name = input.task_name.clone();
        messages.print(format_args!("===== TASK  {name}\n"));

        let start = Instant::now();
        let result = next(input);
        let elapsed = start.elapsed().as_secs_f64();

        if result.failed() {
            if let Some(panic) = &result.panic {
                let backtrace = panic.backtrace.trim_end_matches('\n');
                if backtrace.is_empty() {
                    messages.print(format_args!("{panic}\n"));
                } else {
                    messages.print(format_args!("{panic}\n\n{backtrace}\n"));
                }
            }
        }
        messages.print(format_args!(
            "----- {}: {name} ({elapsed:.2}s)\n",
            result.status
        ));

        result
    })
}

/// Periodically report tasks that are still running.
///
/// A side thread ticks every `interval` until the wrapped run completes. A
/// zero interval disables the notices.
pub fn report_long_run(interval: Duration) -> impl Fn(Runner) -> Runner + Send + Sync + 'static {
    move |next: Runner| -> Runner {
        if interval.is_zero() {
            return next;
        }
        Arc::new(move |input: Input| {
            let messages = input.messages.clone();
            let name = input.task_name.clone();
            let start = Instant::now();
            let (done, finished) = bounded::<()>(0);

            let ticker = thread::spawn(move || {
                let ticks = tick(interval);
                loop {
                    select! {
                        recv(finished) -> _ => break,
                        recv(ticks) -> _ => messages.print(format_args!(
                            "----- RUNNING: {name} ({:.2}s)\n",
                            start.elapsed().as_secs_f64()
                        )),
                    }
                }
            });

            let result = next(input);
            drop(done);
            if ticker.join().is_err() {
                tracing::warn!("long-run reporter thread panicked");
            }
            result
        })
    }
}

/// Report the overall outcome and elapsed time of a flow execution.
///
/// ```text
/// ok	0.153s
/// task failed: build	0.153s
/// ```
pub fn report_flow(next: Executor) -> Executor {
    Arc::new(move |input: ExecuteInput| {
        let messages = input.messages.clone();
        let start = Instant::now();
        let result = next(input);
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(()) => messages.print(format_args!("ok\t{elapsed:.3}s\n")),
            Err(err) => messages.print(format_args!("{err}\t{elapsed:.3}s\n")),
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecuteOptions;
    use crate::output::{Output, SharedBuffer};
    use crate::results::{PanicReport, RunResult, Status};
    use crate::types::ExecuteError;
    use tokio_util::sync::CancellationToken;

    fn input(name: &str, messages: &SharedBuffer) -> Input {
        Input {
            task_name: name.to_string(),
            parallel: false,
            cancel: CancellationToken::new(),
            output: Output::discard(),
            messages: messages.clone().into(),
        }
    }

    fn returning(result: RunResult) -> Runner {
        Arc::new(move |_input: Input| result.clone())
    }

    #[test]
    fn test_report_status_pass() {
        let messages = SharedBuffer::new();
        let runner = report_status(returning(RunResult::new(Status::Passed)));

        runner(input("build", &messages));

        let text = messages.contents_lossy();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "===== TASK  build");
        assert!(lines[1].starts_with("----- PASS: build ("), "got {}", lines[1]);
        assert!(lines[1].ends_with("s)"));
        // two decimal places
        let secs = lines[1].trim_start_matches("----- PASS: build (").trim_end_matches("s)");
        assert_eq!(secs.split('.').nth(1).map(str::len), Some(2));
    }

    #[test]
    fn test_report_status_panic_dump() {
        let messages = SharedBuffer::new();
        let result = RunResult {
            status: Status::Failed,
            panic: Some(PanicReport::new(Some("boom".to_string()), "frame 0\nframe 1\n")),
            duration: Duration::ZERO,
        };

        report_status(returning(result))(input("explode", &messages));

        let text = messages.contents_lossy();
        assert!(
            text.contains("panic: boom\n\nframe 0\nframe 1\n----- FAIL: explode ("),
            "got {text:?}"
        );
    }

    #[test]
    fn test_report_status_panic_without_payload() {
        let messages = SharedBuffer::new();
        let result = RunResult {
            status: Status::Failed,
            panic: Some(PanicReport::new(None, "trace")),
            duration: Duration::ZERO,
        };

        report_status(returning(result))(input("quiet", &messages));

        assert!(messages
            .contents_lossy()
            .contains("panic: <no printable payload>\n\ntrace\n"));
    }

    #[test]
    fn test_report_long_run_ticks_until_done() {
        let messages = SharedBuffer::new();
        let slow: Runner = Arc::new(|_input: Input| {
            thread::sleep(Duration::from_millis(120));
            RunResult::new(Status::Passed)
        });

        let runner = report_long_run(Duration::from_millis(20))(slow);
        runner(input("slow", &messages));
        let after_run = messages.contents_lossy();

        assert!(after_run.contains("----- RUNNING: slow ("), "got {after_run:?}");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(messages.contents_lossy(), after_run, "ticker kept running");
    }

    #[test]
    fn test_report_long_run_zero_interval_is_noop() {
        let messages = SharedBuffer::new();
        let runner = report_long_run(Duration::ZERO)(returning(RunResult::new(Status::Passed)));
        runner(input("fast", &messages));
        assert!(messages.is_empty());
    }

    #[test]
    fn test_report_flow() {
        let messages = SharedBuffer::new();
        let ok: Executor = Arc::new(|_input: ExecuteInput| Ok(()));
        let failing: Executor =
            Arc::new(|_input: ExecuteInput| Err(ExecuteError::TaskFailed("lint".to_string())));
        let request = ExecuteInput {
            cancel: CancellationToken::new(),
            tasks: vec!["lint".to_string()],
            options: ExecuteOptions::default(),
            output: Output::discard(),
            messages: messages.clone().into(),
        };

        report_flow(ok)(request.clone()).unwrap();
        report_flow(failing)(request).unwrap_err();

        let text = messages.contents_lossy();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("ok\t"), "got {:?}", lines[0]);
        assert!(lines[0].ends_with('s'));
        assert_eq!(lines[0].trim_start_matches("ok\t").split('.').nth(1).map(str::len), Some(4));
        assert!(lines[1].starts_with("task failed: lint\t"), "got {:?}", lines[1]);
    }
}
