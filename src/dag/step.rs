// src/dag/step.rs

//! Steps: the schedulable units of a task.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::dag::signal::CompletionSignal;
use crate::errors::GraphError;
use crate::image::ImageReference;
use crate::types::StepStatus;

/// Dependency value meaning "attach only to root, run immediately".
pub const IMMEDIATE_EXECUTION: &str = "-";

/// Resolved dependency declaration of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependencies {
    /// Nothing declared: run after the previous step (or root if first).
    Previous,
    /// `when = ["-"]`: run straight off root.
    Immediate,
    /// Explicit predecessors, in declaration order, without duplicates.
    Steps(Vec<String>),
}

impl Dependencies {
    /// Interpret a declared `when` list.
    pub fn from_declared(step_id: &str, declared: Vec<String>) -> Result<Self, GraphError> {
        let mut ids: Vec<String> = Vec::with_capacity(declared.len());
        for id in declared {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        if ids.is_empty() {
            return Ok(Dependencies::Previous);
        }

        if ids.iter().any(|id| id == IMMEDIATE_EXECUTION) {
            if ids.len() == 1 {
                return Ok(Dependencies::Immediate);
            }
            return Err(GraphError::MisplacedSentinel(step_id.to_string()));
        }

        Ok(Dependencies::Steps(ids))
    }
}

/// Container options shared by command steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub working_directory: Option<PathBuf>,
    pub entry_point: Option<String>,
    pub env: Vec<String>,
    pub privileged: bool,
    pub user: Option<String>,
    pub network: Option<String>,
}

/// What a step actually does when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Run `image` with `args` in a throwaway container.
    Command {
        image: ImageReference,
        args: Vec<String>,
    },
    /// `docker build` with the given tags; `args` excludes the tag flags.
    Build {
        tags: Vec<ImageReference>,
        args: Vec<String>,
    },
    /// Push already-built images.
    Push { images: Vec<ImageReference> },
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Command { .. } => "cmd",
            StepKind::Build { .. } => "build",
            StepKind::Push { .. } => "push",
        }
    }
}

/// An image a step used or produced, with its digest once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDependency {
    pub reference: ImageReference,
    pub digest: Option<String>,
}

/// Mutable runtime fields of a step.
#[derive(Debug, Clone)]
pub struct StepState {
    pub status: StepStatus,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub attempts: u32,
    pub images: Vec<ImageDependency>,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            status: StepStatus::Skipped,
            start_time: None,
            end_time: None,
            attempts: 0,
            images: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    pub dependencies: Dependencies,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub start_delay: Duration,
    pub ignore_errors: bool,
    pub options: RunOptions,

    state: Mutex<StepState>,
    completion: CompletionSignal,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind, dependencies: Dependencies) -> Self {
        Self {
            id: id.into(),
            kind,
            dependencies,
            timeout: Duration::from_secs(crate::task::DEFAULT_STEP_TIMEOUT_SECS),
            retries: 0,
            retry_delay: Duration::from_secs(crate::task::DEFAULT_RETRY_DELAY_SECS),
            start_delay: Duration::ZERO,
            ignore_errors: false,
            options: RunOptions::default(),
            state: Mutex::new(StepState::default()),
            completion: CompletionSignal::new(),
        }
    }

    /// Reject empty IDs and self-references.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.id.is_empty() {
            return Err(GraphError::EmptyStepId);
        }
        if let Dependencies::Steps(ids) = &self.dependencies {
            if ids.iter().any(|id| id == &self.id) {
                return Err(GraphError::SelfReference(self.id.clone()));
            }
        }
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, StepState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> StepStatus {
        self.state().status
    }

    pub fn snapshot(&self) -> StepState {
        self.state().clone()
    }

    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    pub fn mark_in_progress(&self) {
        let mut state = self.state();
        state.status = StepStatus::InProgress;
        state.start_time = Some(Instant::now());
        state.end_time = None;
        state.attempts = 0;
    }

    /// Count one more attempt and return the new total.
    pub fn record_attempt(&self) -> u32 {
        let mut state = self.state();
        state.attempts += 1;
        state.attempts
    }

    pub fn mark_finished(&self, succeeded: bool) {
        let mut state = self.state();
        state.status = if succeeded {
            StepStatus::Successful
        } else {
            StepStatus::Failed
        };
        state.end_time = Some(Instant::now());
    }

    pub fn set_images(&self, images: Vec<ImageDependency>) {
        self.state().images = images;
    }

    /// Images this step runs, builds or pushes.
    pub fn image_references(&self) -> Vec<ImageReference> {
        match &self.kind {
            StepKind::Command { image, .. } => vec![image.clone()],
            StepKind::Build { tags, .. } => tags.clone(),
            StepKind::Push { images } => images.clone(),
        }
    }

    pub fn needs_registry_login(&self) -> bool {
        matches!(self.kind, StepKind::Push { .. })
    }
}
