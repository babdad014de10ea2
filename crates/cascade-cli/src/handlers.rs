//! Command handlers.

use crate::commands::RunArgs;
use crate::notifier::ConsoleNotifier;
use cascade_cloudbuild::CloudBuildClient;
use cascade_core::Result;
use cascade_core::pipeline::PipelineConfig;
use cascade_core::status::TaskStatus;
use cascade_scheduler::{Coordinator, RunOptions, RunReport, TaskGraph};
use console::style;
use std::sync::Arc;

/// Load, validate, and run a pipeline. Returns whether every task
/// succeeded.
pub async fn run(args: RunArgs) -> Result<bool> {
    let include = clean_tags(&args.include);
    let exclude = clean_tags(&args.exclude);

    let config = PipelineConfig::from_path(&args.config)?;
    let config = config.filter(&include, &exclude);

    let overlap: Vec<_> = include
        .iter()
        .filter(|tag| exclude.contains(tag))
        .collect();
    if !overlap.is_empty() {
        println!(
            "{} tags both included and excluded: {:?}",
            style("!").yellow(),
            overlap
        );
    }

    let warnings = config.validate().into_result()?;
    for warning in warnings {
        println!("{} {}", style("!").yellow(), warning.message);
    }

    let graph = TaskGraph::build(config.tasks(), &config.links())?;

    println!("# {}:", config.name);
    print!("{}", graph);
    let manual = graph.manual_tasks();
    if !manual.is_empty() {
        println!("Manual steps:");
        for task in manual {
            println!("\t{}", task.key);
        }
    }
    println!("Using reference: {}", args.reference);
    println!("Fast failing: {}", !args.no_fast_fail);

    let coordinator = Coordinator::new(
        graph,
        Arc::new(CloudBuildClient::from_env()),
        Arc::new(ConsoleNotifier::new()),
        RunOptions {
            concurrency: args.parallel,
            fast_fail: !args.no_fast_fail,
            ..RunOptions::default()
        },
    );

    let report = coordinator.run(&args.reference).await?;
    print_report(&report);
    Ok(report.succeeded())
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn print_report(report: &RunReport) {
    println!();
    for (key, record) in &report.tasks {
        let status = match record.status {
            TaskStatus::Success => style(record.status.to_string()).green(),
            TaskStatus::Failure | TaskStatus::Cancelled => style(record.status.to_string()).red(),
            _ => style(record.status.to_string()).yellow(),
        };
        println!(
            "  {:<12} {} {}",
            status,
            key,
            style(record.log_url.as_deref().unwrap_or("")).dim()
        );
    }
    println!("Run finished in {}s", report.duration().num_seconds());
}

/// Validate a pipeline file without running anything. Returns true when
/// the configuration is valid.
pub fn validate(path: &str) -> Result<bool> {
    let config = PipelineConfig::from_path(path)?;
    let report = config.validate();

    for warning in &report.warnings {
        println!("{} {}", style("!").yellow(), warning.message);
    }
    if !report.is_ok() {
        for error in &report.errors {
            println!("{} {}", style("✗").red(), error);
        }
        return Ok(false);
    }

    // Surface graph problems (duplicates, unknown dependencies, cycles)
    // at validation time too, before any run is attempted.
    let graph = TaskGraph::build(config.tasks(), &config.links())?;

    println!(
        "{} Pipeline \"{}\" is valid",
        style("✓").green(),
        config.name
    );
    println!("  Tasks: {}", graph.len());
    for task in graph.manual_tasks() {
        println!("    manual: {}", task.key);
    }
    Ok(true)
}
