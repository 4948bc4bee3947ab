use anyhow::Result;
use colored::*;
use taskmill_core::Flow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::settings::Settings;

/// Run the requested tasks with the default middlewares installed. Ctrl-C
/// cancels the run: tasks not yet started are not started, running tasks
/// see the cancellation through their context.
pub async fn execute(mut flow: Flow, tasks: Vec<String>, settings: Settings) -> Result<u8> {
    settings.install(&mut flow);
    let options = settings.execute_options();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, canceling the run");
            interrupt.cancel();
        }
    });

    debug!(?tasks, ?options, "executing flow");
    let token = cancel.clone();
    let result = tokio::task::spawn_blocking(move || flow.execute(&token, tasks, options)).await;
    watcher.abort();

    match result? {
        Ok(()) => Ok(0),
        Err(err) => {
            // Failures were already reported by the flow summary line.
            if err.is_invalid_input() {
                eprintln!("{} {}", "error:".red().bold(), err);
            }
            Ok(err.exit_code())
        }
    }
}
