// src/config/model.rs

use serde::Deserialize;

/// Top-level task document as read from TOML.
///
/// ```toml
/// step_timeout = 600
/// total_timeout = 3600
/// registry = "myreg.azurecr.io"
/// push = ["app:v1"]
///
/// [[credentials]]
/// registry = "myreg.azurecr.io"
/// username = "user"
/// password = "secret"
///
/// [[steps]]
/// id = "build"
/// build = "-t app:v1 ."
///
/// [[steps]]
/// cmd = "app:v1 ./run-tests.sh"
/// ```
///
/// Everything is optional at this level; semantic checks and defaults live in
/// [`crate::config::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTaskFile {
    #[serde(default)]
    pub version: Option<String>,

    /// Default per-step timeout in seconds.
    #[serde(default, alias = "stepTimeout")]
    pub step_timeout: Option<u64>,

    /// Whole-run timeout in seconds.
    #[serde(default, alias = "totalTimeout")]
    pub total_timeout: Option<u64>,

    /// Registry prepended to unqualified build tags and push targets.
    #[serde(default)]
    pub registry: Option<String>,

    /// Images pushed once every step has succeeded.
    #[serde(default)]
    pub push: Vec<String>,

    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    #[serde(default)]
    pub steps: Vec<RawStep>,
}

/// `[[credentials]]` entry.
#[derive(Clone, Default, Deserialize)]
pub struct CredentialConfig {
    pub registry: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// `[[steps]]` entry.
///
/// Exactly one of `cmd`, `build` or `push` must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStep {
    /// Defaults to `step_<index>` when empty.
    #[serde(default)]
    pub id: String,

    /// `"<image> <args...>"`, run in a throwaway container.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Arguments for `docker build`.
    #[serde(default)]
    pub build: Option<String>,

    /// Images to push.
    #[serde(default)]
    pub push: Option<Vec<String>>,

    /// Predecessor IDs, or `["-"]` to run immediately.
    #[serde(default)]
    pub when: Vec<String>,

    /// Merged with `when`.
    #[serde(default, alias = "whenAll")]
    pub when_all: Vec<String>,

    /// Seconds; falls back to the task's `step_timeout`.
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub retries: u32,

    /// Seconds between retries.
    #[serde(default, alias = "retryDelay")]
    pub retry_delay: Option<u64>,

    /// Seconds to wait before the first attempt.
    #[serde(default, alias = "startDelay")]
    pub start_delay: u64,

    #[serde(default, alias = "ignoreErrors")]
    pub ignore_errors: bool,

    #[serde(default, alias = "workingDirectory")]
    pub working_directory: Option<String>,

    #[serde(default, alias = "entryPoint")]
    pub entry_point: Option<String>,

    #[serde(default)]
    pub env: Vec<String>,

    #[serde(default)]
    pub privileged: bool,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub network: Option<String>,
}

impl RawStep {
    /// `when` followed by `when_all`, as declared.
    pub fn declared_dependencies(&self) -> Vec<String> {
        self.when
            .iter()
            .chain(self.when_all.iter())
            .map(|s| s.trim().to_string())
            .collect()
    }
}
