// src/engine/login.rs

//! Registry login with bounded retries.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::ExecutorOptions;
use crate::errors::{AcbError, Result};
use crate::exec::{CommandRunner, login_command};
use crate::task::RegistryCredential;

/// Registry assumed for references without a host.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Credential for one registry and whether we have logged in to it.
#[derive(Debug)]
struct RegistrySession {
    credential: RegistryCredential,
    logged_in: OnceCell<()>,
}

/// Logs in to each registry at most once per run.
///
/// Every registry has its own cell: concurrent push steps targeting the
/// same registry wait for one login, while logins to different registries
/// proceed in parallel. A failed login leaves the cell empty.
#[derive(Debug)]
pub struct RegistryLogin {
    sessions: HashMap<String, RegistrySession>,
    docker: String,
    attempts: u32,
    retry_delay: Duration,
}

impl RegistryLogin {
    pub fn new(credentials: &[RegistryCredential], options: &ExecutorOptions) -> Self {
        Self {
            sessions: credentials
                .iter()
                .map(|c| {
                    let session = RegistrySession {
                        credential: c.clone(),
                        logged_in: OnceCell::new(),
                    };
                    (c.registry.clone(), session)
                })
                .collect(),
            docker: options.docker.clone(),
            attempts: options.login_attempts.max(1),
            retry_delay: options.login_retry_delay,
        }
    }

    /// Make sure we are logged in to `registry`, if we hold credentials for it.
    pub async fn ensure(
        &self,
        registry: Option<&str>,
        runner: &dyn CommandRunner,
        deadline: Instant,
    ) -> Result<()> {
        let registry = registry.unwrap_or(DEFAULT_REGISTRY);
        let Some(session) = self.sessions.get(registry) else {
            debug!(registry, "no credentials for registry; skipping login");
            return Ok(());
        };

        session
            .logged_in
            .get_or_try_init(|| self.login_with_retry(&session.credential, runner, deadline))
            .await?;
        Ok(())
    }

    async fn login_with_retry(
        &self,
        credential: &RegistryCredential,
        runner: &dyn CommandRunner,
        deadline: Instant,
    ) -> Result<()> {
        let spec = login_command(credential, &self.docker);
        let mut attempts = 0;
        let mut reason = String::new();

        while attempts < self.attempts {
            attempts += 1;
            match runner.run(&spec, deadline).await {
                Ok(()) => {
                    info!(registry = %credential.registry, attempt = attempts, "logged in to registry");
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        registry = %credential.registry,
                        attempt = attempts,
                        error = %err,
                        "registry login failed"
                    );
                    reason = err.to_string();
                }
            }

            if attempts < self.attempts {
                if Instant::now() + self.retry_delay >= deadline {
                    break;
                }
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(AcbError::LoginFailed {
            registry: credential.registry.clone(),
            attempts,
            reason,
        })
    }
}
