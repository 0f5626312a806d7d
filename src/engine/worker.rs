// src/engine/worker.rs

//! Per-edge workers.
//!
//! One worker is spawned for every edge that is traversed. It retires its
//! edge and only proceeds if it was the last predecessor to do so, which
//! gives at-most-once execution of every step no matter how many
//! predecessors finish at the same moment.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dag::{CompletionSignal, Dag, Node, Step};
use crate::engine::ExecutorOptions;
use crate::engine::login::RegistryLogin;
use crate::errors::{AcbError, Result};
use crate::exec::{BoxFuture, CommandRunner, CommandSpec, step_commands};
use crate::types::IgnoreErrorsPolicy;

/// Held by every live worker. The channel closes once the driver's handle
/// and every worker's clone have been dropped.
pub(crate) type WorkerToken = mpsc::Sender<()>;

/// State shared by every worker of one run.
pub(crate) struct RunContext {
    pub(crate) dag: Dag,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) login: RegistryLogin,
    pub(crate) options: ExecutorOptions,
    pub(crate) deadline: Instant,
    pub(crate) total_timeout: Duration,
    errors: mpsc::Sender<AcbError>,
    aborted: AtomicBool,
    cancelled: CompletionSignal,
}

impl RunContext {
    pub(crate) fn new(
        dag: Dag,
        runner: Arc<dyn CommandRunner>,
        login: RegistryLogin,
        options: ExecutorOptions,
        started: Instant,
        total_timeout: Duration,
        errors: mpsc::Sender<AcbError>,
    ) -> Self {
        Self {
            dag,
            runner,
            login,
            options,
            deadline: started + total_timeout,
            total_timeout,
            errors,
            aborted: AtomicBool::new(false),
            cancelled: CompletionSignal::new(),
        }
    }

    /// Publish a run-aborting error without ever blocking.
    ///
    /// Only the first error is consumed by the driver; extras are dropped
    /// once the buffer is full.
    pub(crate) fn publish(&self, err: AcbError) {
        if let Err(e) = self.errors.try_send(err) {
            debug!(error = %e, "error signal not delivered; a failure is already pending");
        }
    }

    /// Stop workers from starting any further steps.
    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Abort and stop the commands of steps that are already running.
    pub(crate) fn cancel(&self) {
        self.abort();
        self.cancelled.signal();
    }
}

/// Spawn one worker per current child of `parent`.
pub(crate) fn dispatch(ctx: &Arc<RunContext>, parent: &Arc<Node>, token: &WorkerToken) {
    for child in parent.children() {
        tokio::spawn(visit(
            Arc::clone(ctx),
            Arc::clone(parent),
            child,
            token.clone(),
        ));
    }
}

fn visit(
    ctx: Arc<RunContext>,
    parent: Arc<Node>,
    child: Arc<Node>,
    token: WorkerToken,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let remaining = match ctx.dag.remove_edge(parent.id(), child.id()) {
            Ok(remaining) => remaining,
            Err(err) => {
                error!(
                    parent = %parent.id(),
                    step = %child.id(),
                    error = %err,
                    "failed to retire edge"
                );
                ctx.publish(err.into());
                return;
            }
        };

        if remaining > 0 {
            debug!(
                step = %child.id(),
                parent = %parent.id(),
                remaining,
                "waiting on other predecessors"
            );
            return;
        }

        let step = Arc::clone(child.step());
        if ctx.is_aborted() {
            debug!(step = %step.id, "run aborted; leaving step skipped");
            step.completion().signal();
            return;
        }

        let proceed = match execute_step(&ctx, &step).await {
            Ok(()) => true,
            Err(err @ (AcbError::DeadlineExceeded(_) | AcbError::Interrupted)) => {
                warn!(step = %step.id, error = %err, "step cut short by the run");
                ctx.publish(err);
                false
            }
            Err(err)
                if step.ignore_errors
                    && ctx.options.ignore_errors == IgnoreErrorsPolicy::ContinueBranch =>
            {
                warn!(step = %step.id, error = %err, "step failed; ignoring errors as configured");
                true
            }
            Err(err) => {
                error!(step = %step.id, error = %err, "step failed; aborting run");
                ctx.publish(err);
                false
            }
        };

        if proceed {
            dispatch(&ctx, &child, &token);
        }
        step.completion().signal();
    })
}

/// Run one step through its lifecycle, bounded by
/// `min(run deadline, now + step timeout)`.
///
/// When the run deadline is the tighter bound and it passes, the step is
/// left `InProgress` and `DeadlineExceeded` is returned. Cancellation drops
/// the running command and marks the step failed.
async fn execute_step(ctx: &RunContext, step: &Step) -> Result<()> {
    step.mark_in_progress();
    let started = Instant::now();
    let step_deadline = started + step.timeout;
    let run_bound = ctx.deadline < step_deadline;
    let deadline = ctx.deadline.min(step_deadline);

    info!(
        step = %step.id,
        kind = step.kind.label(),
        timeout_secs = step.timeout.as_secs(),
        "starting step"
    );

    let attempted = tokio::select! {
        biased;

        _ = ctx.cancelled.wait() => None,
        res = tokio::time::timeout_at(deadline, attempt_step(ctx, step, deadline)) => Some(res),
    };

    let result = match attempted {
        None => Err(AcbError::Interrupted),
        Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(_)) | Err(_)) if run_bound && Instant::now() >= ctx.deadline => {
            warn!(step = %step.id, "run deadline reached while the step was running");
            return Err(AcbError::DeadlineExceeded(ctx.total_timeout));
        }
        Some(Ok(Err(AcbError::CommandTimedOut)) | Err(_)) => Err(AcbError::StepTimedOut {
            step: step.id.clone(),
            timeout: deadline.saturating_duration_since(started),
        }),
        Some(Ok(Err(err))) => Err(AcbError::step_failed(&step.id, err)),
    };

    step.mark_finished(result.is_ok());
    info!(
        step = %step.id,
        success = result.is_ok(),
        attempts = step.snapshot().attempts,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "step finished"
    );
    result
}

async fn attempt_step(ctx: &RunContext, step: &Step, deadline: Instant) -> Result<()> {
    if !step.start_delay.is_zero() {
        debug!(step = %step.id, delay = ?step.start_delay, "delaying step start");
        tokio::time::sleep(step.start_delay).await;
    }

    if step.needs_registry_login() {
        for image in step.image_references() {
            ctx.login
                .ensure(image.registry(), ctx.runner.as_ref(), deadline)
                .await?;
        }
    }

    let commands = step_commands(step, &ctx.options.docker);
    let max_attempts = step.retries.saturating_add(1);

    loop {
        let attempt = step.record_attempt();
        match run_all(ctx.runner.as_ref(), &commands, deadline).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < max_attempts && !matches!(err, AcbError::CommandTimedOut) => {
                warn!(
                    step = %step.id,
                    attempt,
                    max_attempts,
                    error = %err,
                    "step attempt failed; retrying"
                );
                tokio::time::sleep(step.retry_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn run_all(runner: &dyn CommandRunner, commands: &[CommandSpec], deadline: Instant) -> Result<()> {
    for spec in commands {
        runner.run(spec, deadline).await?;
    }
    Ok(())
}
