// src/errors.rs

//! Crate-wide error types.
//!
//! [`GraphError`] covers everything that can go wrong while the step graph is
//! being assembled; it is raised before any step runs. [`AcbError`] is the
//! run-level error surfaced to the CLI.

use std::time::Duration;

use thiserror::Error;

/// Structural errors raised while building or mutating the step graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("step ID must not be empty")]
    EmptyStepId,

    #[error("step ID '{0}' is reserved")]
    ReservedStepId(String),

    #[error("step '{0}' is declared more than once")]
    DuplicateStep(String),

    #[error("step '{0}' cannot depend on itself")]
    SelfReference(String),

    #[error("step '{step}' depends on unknown step '{dependency}' (dependencies must be declared earlier)")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{0}' mixes the immediate-execution marker \"-\" with other dependencies")]
    MisplacedSentinel(String),

    #[error("vertex '{0}' does not exist")]
    MissingVertex(String),

    #[error("cannot add an edge from '{0}' to itself")]
    SelfEdge(String),

    #[error("edge endpoints must not be empty")]
    EmptyEdgeEndpoint,

    #[error("cycle detected in step graph involving '{0}'")]
    Cycle(String),

    #[error("no edge from '{from}' to '{to}'")]
    MissingEdge { from: String, to: String },

    #[error("in-degree of '{0}' would drop below zero")]
    DegreeUnderflow(String),
}

#[derive(Error, Debug)]
pub enum AcbError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("invalid step graph: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid image reference '{0}'")]
    InvalidImageReference(String),

    #[error("command exited with status {exit_code}")]
    CommandFailed { exit_code: i32 },

    #[error("command did not finish before its deadline")]
    CommandTimedOut,

    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<AcbError>,
    },

    #[error("step '{step}' timed out after {timeout:?}")]
    StepTimedOut { step: String, timeout: Duration },

    #[error("run exceeded its total timeout of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("login to registry '{registry}' failed after {attempts} attempts: {reason}")]
    LoginFailed {
        registry: String,
        attempts: u32,
        reason: String,
    },

    #[error("failed to push '{image}': {reason}")]
    PushFailed { image: String, reason: String },

    #[error("run interrupted")]
    Interrupted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AcbError {
    /// Wrap an execution error with the ID of the step that produced it.
    pub fn step_failed(step: impl Into<String>, source: AcbError) -> Self {
        AcbError::StepFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, AcbError>;
