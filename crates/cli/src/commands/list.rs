use colored::*;
use taskmill_core::Flow;

pub fn execute(flow: &Flow) {
    println!("{}", "Tasks".bold().underline());

    let mut tasks: Vec<_> = flow.registry().tasks().map(|(_, task)| task).collect();
    if tasks.is_empty() {
        println!("  {}", "No tasks defined".dimmed());
        return;
    }
    tasks.sort_by(|a, b| a.name().cmp(b.name()));

    let width = tasks.iter().map(|task| task.name().len()).max().unwrap_or(0);
    for task in tasks {
        let name = format!("{:width$}", task.name());
        let marker = if task.is_parallel() {
            " [parallel]".yellow()
        } else {
            "".normal()
        };
        if task.usage().is_empty() {
            println!("  {}{}", name.blue().bold(), marker);
        } else {
            println!("  {}  {}{}", name.blue().bold(), task.usage().dimmed(), marker);
        }
    }
}
