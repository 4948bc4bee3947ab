use colored::*;
use taskmill_core::Flow;

use crate::settings::Settings;

/// Print the execution order and return the exit status.
pub fn execute(flow: &Flow, tasks: &[String], settings: &Settings) -> u8 {
    let plan = match flow.plan(tasks.iter().cloned(), &settings.execute_options()) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return err.exit_code();
        }
    };

    println!("{} {}", "Execution plan for".bold(), tasks.join(", ").cyan());
    println!("\n{}:", "Execution order".bold());
    for (i, name) in plan.iter().enumerate() {
        let parallel = flow
            .registry()
            .lookup(name)
            .and_then(|handle| flow.registry().get(handle))
            .is_some_and(|task| task.is_parallel());

        let mut notes = Vec::new();
        if settings.skip.contains(name) {
            notes.push("skipped");
        }
        if parallel {
            notes.push("parallel");
        }
        if notes.is_empty() {
            println!("  {}. {}", i + 1, name);
        } else {
            println!("  {}. {} {}", i + 1, name, format!("({})", notes.join(", ")).dimmed());
        }
    }
    if settings.dry_run {
        println!("\n{}", "Dry run: no action would be executed".yellow());
    }
    0
}
