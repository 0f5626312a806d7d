// src/task.rs

//! The normalised task (pipeline) a run executes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::dag::{Dag, Step, build_dag};
use crate::errors::GraphError;
use crate::image::ImageReference;

pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 600;
pub const MIN_STEP_TIMEOUT_SECS: u64 = 1;
pub const MAX_STEP_TIMEOUT_SECS: u64 = 6 * 60 * 60;

pub const DEFAULT_TOTAL_TIMEOUT_SECS: u64 = 60 * 60;
pub const MIN_TOTAL_TIMEOUT_SECS: u64 = 10;
pub const MAX_TOTAL_TIMEOUT_SECS: u64 = 6 * 60 * 60;

pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Clamp a step timeout (seconds) into its bounds.
pub fn clamp_step_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(MIN_STEP_TIMEOUT_SECS, MAX_STEP_TIMEOUT_SECS))
}

/// Clamp a total timeout (seconds) into its bounds, never below `step_timeout`.
pub fn clamp_total_timeout(secs: u64, step_timeout: Duration) -> Duration {
    let total = Duration::from_secs(secs.clamp(MIN_TOTAL_TIMEOUT_SECS, MAX_TOTAL_TIMEOUT_SECS));
    total.max(step_timeout)
}

/// Login credentials for one registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredential {
    pub registry: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A validated, normalised task.
///
/// Built from a raw document by `config::validate`. Steps carry their own
/// runtime state, so a `Task` describes exactly one run.
#[derive(Debug)]
pub struct Task {
    pub version: Option<String>,
    pub steps: Vec<Arc<Step>>,
    pub step_timeout: Duration,
    pub total_timeout: Duration,
    pub push: Vec<ImageReference>,
    pub registry: Option<String>,
    pub credentials: Vec<RegistryCredential>,
}

impl Task {
    /// Build the dependency graph for this run.
    pub fn build_dag(&self) -> Result<Dag, GraphError> {
        build_dag(&self.steps)
    }

    pub fn step(&self, id: &str) -> Option<&Arc<Step>> {
        self.steps.iter().find(|s| s.id == id)
    }
}
