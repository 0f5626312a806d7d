// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod image;
pub mod logging;
pub mod task;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_from_path, validate_task};
use crate::dag::{StepKind, execution_plan};
use crate::engine::{Executor, ExecutorOptions};
use crate::exec::{DockerDigestResolver, ProcessRunner};
use crate::task::Task;

/// High-level entry point used by `main.rs`.
///
/// Loads and normalises the task file, then either prints the execution
/// plan (`--dry-run`) or runs it until completion, failure or Ctrl-C.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut raw = load_from_path(&args.file)
        .with_context(|| format!("loading task file '{}'", args.file.display()))?;
    if let Some(registry) = args.registry.clone() {
        debug!(%registry, "registry overridden from the command line");
        raw.registry = Some(registry);
    }
    let task = validate_task(raw)?;

    if args.dry_run {
        print_dry_run(&task)?;
        return Ok(());
    }

    let options = ExecutorOptions {
        docker: args.docker.clone(),
        ..ExecutorOptions::default()
    };
    let executor = Executor::new(
        Arc::new(ProcessRunner::new()),
        Arc::new(DockerDigestResolver::new(args.docker.clone())),
        options,
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => warn!("Ctrl-C received, aborting run"),
            Err(e) => {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    };

    executor.run_until(&task, shutdown).await.into_result()?;
    info!("all steps completed");
    Ok(())
}

/// Print the steps in execution order with their payloads.
fn print_dry_run(task: &Task) -> Result<()> {
    let dag = task.build_dag()?;
    let plan = execution_plan(&dag)?;

    println!("acb dry-run");
    println!("  step_timeout = {}s", task.step_timeout.as_secs());
    println!("  total_timeout = {}s", task.total_timeout.as_secs());
    if let Some(ref registry) = task.registry {
        println!("  registry = {registry}");
    }
    println!();

    println!("steps ({}):", plan.len());
    for planned in &plan {
        let Some(step) = task.step(&planned.id) else {
            continue;
        };
        println!("  - {}", step.id);
        match &step.kind {
            StepKind::Command { image, args } => {
                println!("      cmd: {image} {}", args.join(" "));
            }
            StepKind::Build { tags, args } => {
                println!("      build: {}", args.join(" "));
                for tag in tags {
                    println!("      tag: {tag}");
                }
            }
            StepKind::Push { images } => {
                for image in images {
                    println!("      push: {image}");
                }
            }
        }
        if !planned.waits_for.is_empty() {
            println!("      after: {:?}", planned.waits_for);
        }
        if step.retries > 0 {
            println!("      retries: {}", step.retries);
        }
        if step.ignore_errors {
            println!("      ignore_errors: true");
        }
    }

    if !task.push.is_empty() {
        println!();
        println!("push ({}):", task.push.len());
        for image in &task.push {
            println!("  - {image}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
