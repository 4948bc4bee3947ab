use colored::*;
use taskmill_core::Flow;

pub fn execute(flow: &Flow) {
    println!("{}", "Task Dependency Graph:".bold().underline());

    let registry = flow.registry();
    if registry.is_empty() {
        println!("No tasks defined");
        return;
    }

    for (_, task) in registry.tasks() {
        println!("{}", task.name().blue().bold());

        let deps: Vec<&str> = task
            .dependencies()
            .iter()
            .filter_map(|dep| registry.get(*dep))
            .map(|dep| dep.name())
            .collect();

        if !deps.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), deps.join(", "));
        } else {
            println!("  {}", "no dependencies".dimmed());
        }
        println!();
    }
}
