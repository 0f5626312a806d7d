// src/exec/mod.rs

//! External collaborators the engine drives.
//!
//! - [`backend`] defines the [`CommandRunner`] seam and [`CommandSpec`].
//! - [`process`] is the production runner built on `tokio::process`.
//! - [`command`] turns step payloads, logins and pushes into docker argv.
//! - [`digest`] looks up image digests for reporting.

pub mod backend;
pub mod command;
pub mod digest;
pub mod process;

pub use backend::{BoxFuture, CommandRunner, CommandSpec};
pub use command::{login_command, push_command, step_commands};
pub use digest::{DigestResolver, DockerDigestResolver};
pub use process::ProcessRunner;
