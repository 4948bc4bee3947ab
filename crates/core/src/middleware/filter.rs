//! Short-circuit middlewares

use std::collections::HashSet;
use std::sync::Arc;

use crate::middleware::{Input, Runner};
use crate::results::{RunResult, Status};

/// Never run any action and report every task as passed.
pub fn dry_run(_next: Runner) -> Runner {
    Arc::new(|input: Input| {
        tracing::debug!(task = %input.task_name, "dry run");
        RunResult::new(Status::Passed)
    })
}

/// Do not run the listed tasks; they report [`Status::NotRun`].
pub fn no_run<I, S>(names: I) -> impl Fn(Runner) -> Runner + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Arc<HashSet<String>> = Arc::new(names.into_iter().map(Into::into).collect());
    move |next: Runner| -> Runner {
        let names = names.clone();
        Arc::new(move |input: Input| {
            if names.contains(&input.task_name) {
                return RunResult::new(Status::NotRun);
            }
            next(input)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Output;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    fn input(name: &str) -> Input {
        Input {
            task_name: name.to_string(),
            parallel: false,
            cancel: CancellationToken::new(),
            output: Output::discard(),
            messages: Output::discard(),
        }
    }

    fn counting(calls: Arc<AtomicUsize>) -> Runner {
        Arc::new(move |_input: Input| {
            calls.fetch_add(1, Ordering::SeqCst);
            RunResult::new(Status::Failed)
        })
    }

    #[test]
    fn test_dry_run_never_calls_next() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = dry_run(counting(calls.clone()));

        assert_eq!(runner(input("deploy")).status, Status::Passed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_run_filters_by_name() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = no_run(["slow", "flaky"])(counting(calls.clone()));

        assert_eq!(runner(input("slow")).status, Status::NotRun);
        assert_eq!(runner(input("flaky")).status, Status::NotRun);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(runner(input("build")).status, Status::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
