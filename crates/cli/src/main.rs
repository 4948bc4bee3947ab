use std::fs;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use taskmill_core::{ActionContext, Flow, TaskDef};

/// The flow taskmill uses for its own housekeeping.
fn build_flow() -> Result<Flow> {
    let mut flow = Flow::new();

    let fmt = flow.define(
        TaskDef::new("fmt")
            .usage("Check formatting")
            .action(|ctx: &ActionContext| ctx.log("formatting is clean")),
    )?;

    let lint = flow.define(
        TaskDef::new("lint")
            .usage("Run lints")
            .parallel(true)
            .deps([fmt])
            .action(|ctx: &ActionContext| {
                ctx.set_env("TASKMILL_LINT_LEVEL", "strict");
                ctx.log("no lint warnings");
            }),
    )?;

    let test = flow.define(
        TaskDef::new("test")
            .usage("Run the test suite")
            .parallel(true)
            .deps([fmt])
            .action(|ctx: &ActionContext| {
                for suite in ["registry", "scheduler", "runtime"] {
                    if ctx.is_cancelled() {
                        ctx.skip("canceled");
                    }
                    ctx.log(format!("suite {suite}: ok"));
                    thread::sleep(Duration::from_millis(50));
                }
            }),
    )?;

    let package = flow.define(
        TaskDef::new("package")
            .usage("Assemble the release archive")
            .deps([lint, test])
            .action(|ctx: &ActionContext| {
                let dir = ctx.temp_dir();
                let manifest = dir.join("MANIFEST");
                if let Err(err) = fs::write(&manifest, "taskmill\n") {
                    ctx.fatal(format!("cannot write {}: {err}", manifest.display()));
                }
                ctx.log(format!("staged release in {}", dir.display()));
            }),
    )?;

    flow.define(
        TaskDef::new("all")
            .usage("Run every check and build the package")
            .deps([package]),
    )?;

    Ok(flow)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let flow = build_flow()?;
    Ok(taskmill_cli::run(flow, std::env::args_os()).await)
}
