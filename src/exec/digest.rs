// src/exec/digest.rs

//! Image digest lookup.

use std::time::Duration;

use anyhow::Context;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{AcbError, Result};
use crate::exec::backend::BoxFuture;
use crate::image::ImageReference;

/// Resolves the content digest of an image reference.
///
/// `Ok(None)` means the image is unknown to the resolver; callers treat every
/// outcome as best-effort.
pub trait DigestResolver: Send + Sync {
    fn resolve<'a>(&'a self, image: &'a ImageReference) -> BoxFuture<'a, Result<Option<String>>>;
}

/// Looks digests up with `docker image inspect`.
#[derive(Debug, Clone)]
pub struct DockerDigestResolver {
    docker: String,
    timeout: Duration,
}

impl DockerDigestResolver {
    pub fn new(docker: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl DigestResolver for DockerDigestResolver {
    fn resolve<'a>(&'a self, image: &'a ImageReference) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let output = Command::new(&self.docker)
                .args([
                    "image",
                    "inspect",
                    "--format",
                    "{{index .RepoDigests 0}}",
                    &image.to_string(),
                ])
                .kill_on_drop(true)
                .output();

            let output = tokio::time::timeout(self.timeout, output)
                .await
                .map_err(|_| AcbError::CommandTimedOut)?
                .with_context(|| format!("inspecting image '{image}'"))?;

            if !output.status.success() {
                debug!(image = %image, "image not found locally; no digest");
                return Ok(None);
            }

            Ok(parse_repo_digest(&String::from_utf8_lossy(&output.stdout)))
        })
    }
}

/// Extract `sha256:...` from `repo@sha256:...`.
pub fn parse_repo_digest(repo_digest: &str) -> Option<String> {
    repo_digest
        .trim()
        .split_once('@')
        .map(|(_, digest)| digest.to_string())
        .filter(|digest| !digest.is_empty())
}
