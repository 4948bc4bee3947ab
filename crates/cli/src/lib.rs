//! Taskmill command line
//!
//! Turns a [`Flow`] built by the caller into a command-line program: flag
//! parsing, configuration file loading, the default reporting middlewares,
//! Ctrl-C cancellation and exit codes.
//!
//! ```rust,no_run
//! use std::process::ExitCode;
//! use taskmill_core::{ActionContext, Flow, TaskDef};
//!
//! #[tokio::main]
//! async fn main() -> ExitCode {
//!     let mut flow = Flow::new();
//!     flow.define(TaskDef::new("hello").action(|ctx: &ActionContext| ctx.log("hello")))
//!         .unwrap();
//!     taskmill_cli::run(flow, std::env::args_os()).await
//! }
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::*;
use taskmill_core::Flow;
use tracing_subscriber::EnvFilter;

mod commands;
mod settings;

pub use settings::Settings;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "TASKMILL_LOG";

/// Taskmill - run the tasks of a flow
#[derive(Parser, Debug, Default)]
#[command(name = "taskmill")]
#[command(about = "Run the tasks of a taskmill flow")]
#[command(version)]
pub struct Cli {
    /// Tasks to run, in order
    pub tasks: Vec<String>,

    /// Show the output of tasks that do not fail
    #[arg(short, long)]
    pub verbose: bool,

    /// Run only the named tasks, without their dependencies
    #[arg(long)]
    pub no_deps: bool,

    /// Do not run the action of this task (repeatable)
    #[arg(long, value_name = "TASK")]
    pub skip: Vec<String>,

    /// Report every task as passed without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds between "still running" notices (0 disables them)
    #[arg(long, value_name = "SECS")]
    pub long_run: Option<u64>,

    /// Path to the configuration file (defaults to ./taskmill.yml when present)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List the defined tasks
    #[arg(long, conflicts_with_all = ["plan", "graph"])]
    pub list: bool,

    /// Show the execution order without running anything
    #[arg(long, conflicts_with = "graph")]
    pub plan: bool,

    /// Show the task dependency graph
    #[arg(long)]
    pub graph: bool,
}

/// Parse `args`, run the requested view or execution on `flow`, and map the
/// outcome to a process exit code.
pub async fn run<I, T>(flow: Flow, args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    ExitCode::from(run_with_status(flow, args).await)
}

/// Like [`run`], returning the raw exit status: 0 when every requested task
/// passed, 1 when a task failed or the run was canceled, 2 for invalid input.
pub async fn run_with_status<I, T>(flow: Flow, args: I) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    init_logging();

    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            if let Err(print_err) = err.print() {
                tracing::warn!(error = %print_err, "failed to print usage");
            }
            return u8::try_from(err.exit_code()).unwrap_or(2);
        }
    };

    match dispatch(flow, cli).await {
        Ok(status) => status,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            2
        }
    }
}

async fn dispatch(flow: Flow, cli: Cli) -> Result<u8> {
    let settings = Settings::resolve(&cli)?;

    if cli.list {
        commands::list::execute(&flow);
        return Ok(0);
    }
    if cli.graph {
        commands::graph::execute(&flow);
        return Ok(0);
    }
    if cli.plan {
        return Ok(commands::plan::execute(&flow, &cli.tasks, &settings));
    }
    commands::run::execute(flow, cli.tasks, settings).await
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // Embedders may already have installed a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
