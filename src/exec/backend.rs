// src/exec/backend.rs

//! Pluggable command execution.
//!
//! The engine never spawns processes itself; it hands a [`CommandSpec`] and a
//! deadline to a [`CommandRunner`]. Production uses
//! [`crate::exec::ProcessRunner`]; tests substitute a fake that records calls
//! and simulates outcomes.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::time::Instant;

use crate::errors::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single external command.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Label used in logs and by fakes: the step ID, `login:<registry>` or
    /// `push:<image>`.
    pub name: String,
    pub argv: Vec<String>,
    /// Written to the process's stdin, then closed.
    pub stdin: Option<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            argv,
            stdin: None,
            working_dir: None,
        }
    }

    /// The command line, for logging.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("argv", &self.argv)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

/// Runs external commands on behalf of the engine.
///
/// Implementations must stop the underlying process once `deadline` passes
/// and must tolerate the returned future being dropped mid-flight.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, spec: &'a CommandSpec, deadline: Instant) -> BoxFuture<'a, Result<()>>;
}
