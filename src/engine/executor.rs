// src/engine/executor.rs

//! Outer driver for one run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dag::Step;
use crate::engine::ExecutorOptions;
use crate::engine::login::RegistryLogin;
use crate::engine::report::{self, RunSummary};
use crate::engine::worker::{RunContext, dispatch};
use crate::errors::{AcbError, Result};
use crate::exec::{CommandRunner, DigestResolver, push_command};
use crate::task::Task;

/// Executes a [`Task`] against a command runner.
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
    digests: Arc<dyn DigestResolver>,
    options: ExecutorOptions,
}

impl Executor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        digests: Arc<dyn DigestResolver>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            runner,
            digests,
            options,
        }
    }

    /// Run every step of `task`, then push its images.
    ///
    /// Always returns a summary; the first error of the run (if any) is
    /// carried inside it.
    pub async fn run(&self, task: &Task) -> RunSummary {
        self.run_until(task, std::future::pending()).await
    }

    /// Like [`Executor::run`], but cancels the run once `shutdown`
    /// completes. Running commands are dropped, the run waits for its
    /// workers to exit and the summary reports [`AcbError::Interrupted`].
    pub async fn run_until<F>(&self, task: &Task, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        info!(
            steps = task.steps.len(),
            step_timeout_secs = task.step_timeout.as_secs(),
            total_timeout_secs = task.total_timeout.as_secs(),
            "starting run"
        );

        let outcome = self.execute(task, started, shutdown).await;
        if let Err(ref err) = outcome {
            error!(error = %err, "run failed");
        }

        report::populate_digests(&task.steps, self.digests.as_ref()).await;
        let summary = report::collect(&task.steps, started, outcome.err());
        summary.log();
        summary
    }

    async fn execute<F>(&self, task: &Task, started: Instant, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let dag = task.build_dag()?;

        // One slot per step: every worker can report without blocking.
        let (errors_tx, mut errors_rx) = mpsc::channel(task.steps.len().max(1));
        let login = RegistryLogin::new(&task.credentials, &self.options);
        let ctx = Arc::new(RunContext::new(
            dag,
            Arc::clone(&self.runner),
            login,
            self.options.clone(),
            started,
            task.total_timeout,
            errors_tx,
        ));

        let (token, mut workers) = mpsc::channel::<()>(1);
        dispatch(&ctx, ctx.dag.root(), &token);
        drop(token);

        let outcome = tokio::select! {
            biased;

            _ = shutdown => {
                warn!("shutdown requested; cancelling running steps");
                Err(AcbError::Interrupted)
            }
            outcome = self.drive(&ctx, task, &mut errors_rx) => outcome,
        };

        match outcome {
            Ok(()) => Ok(()),
            // In-flight steps keep the status they had at the deadline.
            Err(err @ AcbError::DeadlineExceeded(_)) => {
                ctx.abort();
                Err(err)
            }
            Err(err @ AcbError::Interrupted) => {
                ctx.cancel();
                wait_for_workers(&mut workers, ctx.deadline).await;
                Err(err)
            }
            Err(err) => {
                ctx.abort();
                wait_for_workers(&mut workers, ctx.deadline).await;
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        task: &Task,
        errors: &mut mpsc::Receiver<AcbError>,
    ) -> Result<()> {
        wait_for_steps(&task.steps, errors, ctx.deadline, ctx.total_timeout).await?;
        self.push_images(ctx, task).await
    }

    /// Push the task's images once every step has succeeded. Stops at the
    /// first failure.
    async fn push_images(&self, ctx: &RunContext, task: &Task) -> Result<()> {
        if task.push.is_empty() {
            return Ok(());
        }

        info!(images = task.push.len(), "pushing images");
        for image in &task.push {
            ctx.login
                .ensure(image.registry(), self.runner.as_ref(), ctx.deadline)
                .await?;

            let spec = push_command(image, &self.options.docker);
            let pushed =
                tokio::time::timeout_at(ctx.deadline, self.runner.run(&spec, ctx.deadline)).await;
            match pushed {
                Ok(Ok(())) => info!(image = %image, "pushed image"),
                Ok(Err(err)) => {
                    return Err(AcbError::PushFailed {
                        image: image.to_string(),
                        reason: err.to_string(),
                    });
                }
                Err(_) => {
                    return Err(AcbError::PushFailed {
                        image: image.to_string(),
                        reason: "run deadline reached".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Wait for every step's completion signal in declaration order.
///
/// A published error or the run deadline ends the wait early; errors are
/// checked first so a failure that races the deadline is reported as such.
async fn wait_for_steps(
    steps: &[Arc<Step>],
    errors: &mut mpsc::Receiver<AcbError>,
    deadline: Instant,
    total_timeout: Duration,
) -> Result<()> {
    for step in steps {
        tokio::select! {
            biased;

            Some(err) = errors.recv() => return Err(err),
            _ = tokio::time::sleep_until(deadline) => {
                warn!(step = %step.id, "run deadline reached while waiting");
                return Err(AcbError::DeadlineExceeded(total_timeout));
            }
            _ = step.completion().wait() => {
                debug!(step = %step.id, status = %step.status(), "step completed");
            }
        }
    }

    // A worker may have published after the last completion we saw.
    match errors.try_recv() {
        Ok(err) => Err(err),
        Err(_) => Ok(()),
    }
}

/// Wait until every worker has exited, bounded by the run deadline.
///
/// Steps that were already running get to record their final status.
async fn wait_for_workers(workers: &mut mpsc::Receiver<()>, deadline: Instant) {
    debug!("waiting for workers after abort");
    if tokio::time::timeout_at(deadline, workers.recv()).await.is_err() {
        warn!("workers still running at the run deadline");
    }
}
