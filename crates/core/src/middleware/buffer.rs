//! Output buffering middlewares

use std::sync::Arc;

use tracing::warn;

use crate::middleware::{Input, Runner};
use crate::output::{Recorder, SharedBuffer};

/// Hide the standard output of tasks that do not fail.
///
/// The task writes into a private buffer which is copied to the real output
/// only when the run ends with [`Status::Failed`](crate::results::Status).
pub fn silent_non_failing(next: Runner) -> Runner {
    Arc::new(move |mut input: Input| {
        let target = input.output.clone();
        let buffer = SharedBuffer::new();
        input.output = buffer.clone().into();

        let result = next(input);
        if result.failed() {
            if let Err(err) = buffer.flush_to(&target) {
                warn!(error = %err, "failed to flush buffered task output");
            }
        }
        result
    })
}

/// Keep the output of parallel tasks contiguous.
///
/// Both streams of a parallel task are recorded while it runs and replayed,
/// in their original order, once it finishes. Sequential tasks write through
/// untouched.
pub fn buffer_parallel(next: Runner) -> Runner {
    Arc::new(move |mut input: Input| {
        if !input.parallel {
            return next(input);
        }

        let standard = input.output.clone();
        let messaging = input.messages.clone();
        let recorder = Recorder::new();
        input.output = recorder.standard();
        input.messages = recorder.messaging();

        let result = next(input);
        if let Err(err) = recorder.replay(&standard, &messaging) {
            warn!(error = %err, "failed to replay parallel task output");
        }
        result
    })
}
