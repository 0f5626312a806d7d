// src/config/mod.rs

//! Task document loading and normalisation.
//!
//! - [`model`] is the TOML-backed document schema.
//! - [`loader`] reads and parses documents.
//! - [`validate`] normalises a raw document into a [`crate::task::Task`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_task_path, load_and_validate, load_from_path, parse_str, validate_task};
pub use model::{CredentialConfig, RawStep, RawTaskFile};
