// src/engine/mod.rs

//! Run engine.
//!
//! - [`executor`] is the outer driver: builds the graph, launches root's
//!   children, waits on completion signals, the error signal and the run
//!   deadline, then pushes images and reports.
//! - [`worker`] retires edges, runs steps whose in-degree reaches zero
//!   (with per-step deadline and retries) and fans out to their children.
//! - [`login`] performs registry login with bounded retries.
//! - [`report`] populates image digests and summarises step status/timing.

use std::time::Duration;

use crate::types::IgnoreErrorsPolicy;

pub mod executor;
pub mod login;
pub mod report;
pub mod worker;

pub use executor::Executor;
pub use login::RegistryLogin;
pub use report::{RunSummary, StepReport};

pub const DEFAULT_LOGIN_ATTEMPTS: u32 = 3;
pub const DEFAULT_LOGIN_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Knobs for a run that do not come from the task document.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Container CLI binary (`docker`, `podman`, ...).
    pub docker: String,
    pub login_attempts: u32,
    pub login_retry_delay: Duration,
    pub ignore_errors: IgnoreErrorsPolicy,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            login_attempts: DEFAULT_LOGIN_ATTEMPTS,
            login_retry_delay: DEFAULT_LOGIN_RETRY_DELAY,
            ignore_errors: IgnoreErrorsPolicy::default(),
        }
    }
}
