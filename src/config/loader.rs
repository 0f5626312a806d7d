// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::RawTaskFile;
use crate::errors::Result;
use crate::task::Task;

/// Load a task document from `path` without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawTaskFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Parse a task document from a TOML string.
pub fn parse_str(contents: &str) -> Result<RawTaskFile> {
    let raw: RawTaskFile = toml::from_str(contents)?;
    Ok(raw)
}

/// Normalise a raw document and check that its step graph can be built.
///
/// Graph construction errors (unknown or forward dependencies, duplicate
/// IDs) surface here, before anything runs.
pub fn validate_task(raw: RawTaskFile) -> Result<Task> {
    let task = Task::try_from(raw)?;
    task.build_dag()?;
    Ok(task)
}

/// Load, normalise and validate a task document.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Task> {
    validate_task(load_from_path(path)?)
}

/// Default task file: `acb.toml` in the current working directory.
pub fn default_task_path() -> PathBuf {
    PathBuf::from("acb.toml")
}
