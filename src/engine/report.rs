// src/engine/report.rs

//! Post-run reporting: image digests and per-step status/timing.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dag::{ImageDependency, Step};
use crate::errors::{AcbError, Result};
use crate::exec::DigestResolver;
use crate::types::StepStatus;

/// Final view of one step.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub id: String,
    pub status: StepStatus,
    pub attempts: u32,
    /// Offset from the start of the run.
    pub started_at: Option<Duration>,
    pub elapsed: Option<Duration>,
    pub images: Vec<ImageDependency>,
}

/// Outcome of a run.
#[derive(Debug)]
pub struct RunSummary {
    pub steps: Vec<StepReport>,
    /// First error of the run, if it failed.
    pub error: Option<AcbError>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn step(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn log(&self) {
        for step in &self.steps {
            info!(
                step = %step.id,
                status = %step.status,
                attempts = step.attempts,
                elapsed_ms = step.elapsed.map(|d| d.as_millis() as u64),
                "step summary"
            );
        }
        match &self.error {
            None => info!(elapsed_ms = self.elapsed.as_millis() as u64, "run succeeded"),
            Some(err) => warn!(
                elapsed_ms = self.elapsed.as_millis() as u64,
                error = %err,
                "run failed"
            ),
        }
    }
}

/// Fill in digests for the images of every successful step.
///
/// Best effort: lookup failures are logged and leave the digest empty.
pub async fn populate_digests(steps: &[Arc<Step>], resolver: &dyn DigestResolver) {
    for step in steps {
        if step.status() != StepStatus::Successful {
            continue;
        }

        let mut images = Vec::new();
        for reference in step.image_references() {
            let digest = match reference.digest.clone() {
                Some(digest) => Some(digest),
                None => match resolver.resolve(&reference).await {
                    Ok(digest) => digest,
                    Err(err) => {
                        warn!(step = %step.id, image = %reference, error = %err, "could not resolve image digest");
                        None
                    }
                },
            };
            debug!(step = %step.id, image = %reference, ?digest, "image dependency");
            images.push(ImageDependency { reference, digest });
        }
        step.set_images(images);
    }
}

/// Snapshot every step into a [`RunSummary`].
pub fn collect(steps: &[Arc<Step>], run_started: Instant, error: Option<AcbError>) -> RunSummary {
    let reports = steps
        .iter()
        .map(|step| {
            let state = step.snapshot();
            StepReport {
                id: step.id.clone(),
                status: state.status,
                attempts: state.attempts,
                started_at: state
                    .start_time
                    .map(|t| t.saturating_duration_since(run_started)),
                elapsed: match (state.start_time, state.end_time) {
                    (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
                    _ => None,
                },
                images: state.images,
            }
        })
        .collect();

    RunSummary {
        steps: reports,
        error,
        elapsed: run_started.elapsed(),
    }
}
