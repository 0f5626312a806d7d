// src/exec/process.rs

//! Real process runner built on `tokio::process`.

use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{AcbError, Result};
use crate::exec::backend::{BoxFuture, CommandRunner, CommandSpec};

/// Spawns each [`CommandSpec`] as a child process.
///
/// Children are killed when their deadline passes or when the future running
/// them is dropped.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec, deadline: Instant) -> BoxFuture<'a, Result<()>> {
        Box::pin(run_process(spec, deadline))
    }
}

async fn run_process(spec: &CommandSpec, deadline: Instant) -> Result<()> {
    let (program, args) = spec.argv.split_first().ok_or_else(|| {
        AcbError::ConfigError(format!("command '{}' has no program", spec.name))
    })?;

    info!(name = %spec.name, cmd = %spec.display(), "starting process");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for '{}'", spec.name))?;

    if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
        stdin
            .write_all(input.as_bytes())
            .await
            .with_context(|| format!("writing stdin of '{}'", spec.name))?;
        // Dropping closes the pipe so the child sees EOF.
        drop(stdin);
    }

    if let Some(stdout) = child.stdout.take() {
        forward_lines(spec.name.clone(), stdout, false);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(spec.name.clone(), stderr, true);
    }

    match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(status) => {
            let status =
                status.with_context(|| format!("waiting for process of '{}'", spec.name))?;
            let code = status.code().unwrap_or(-1);
            info!(
                name = %spec.name,
                exit_code = code,
                success = status.success(),
                "process exited"
            );
            if status.success() {
                Ok(())
            } else {
                Err(AcbError::CommandFailed { exit_code: code })
            }
        }
        Err(_) => {
            warn!(name = %spec.name, "deadline reached; killing process");
            if let Err(e) = child.kill().await {
                warn!(name = %spec.name, error = %e, "failed to kill process");
            }
            Err(AcbError::CommandTimedOut)
        }
    }
}

/// Consume a child pipe line by line so its buffer never fills.
fn forward_lines<R>(name: String, pipe: R, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                debug!(name = %name, "stderr: {}", line);
            } else {
                info!(name = %name, "stdout: {}", line);
            }
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(
            "test",
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        )
    }

    #[tokio::test]
    async fn successful_command() {
        let deadline = Instant::now() + Duration::from_secs(10);
        ProcessRunner::new().run(&sh("exit 0"), deadline).await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let deadline = Instant::now() + Duration::from_secs(10);
        let err = ProcessRunner::new()
            .run(&sh("exit 3"), deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, AcbError::CommandFailed { exit_code: 3 }));
    }

    #[tokio::test]
    async fn stdin_is_delivered() {
        let mut spec = sh("read line; test \"$line\" = secret");
        spec.stdin = Some("secret\n".to_string());
        let deadline = Instant::now() + Duration::from_secs(10);
        ProcessRunner::new().run(&spec, deadline).await.unwrap();
    }

    #[tokio::test]
    async fn deadline_kills_the_process() {
        let deadline = Instant::now() + Duration::from_millis(200);
        let err = ProcessRunner::new()
            .run(&sh("sleep 30"), deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, AcbError::CommandTimedOut));
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let spec = CommandSpec::new("empty", vec![]);
        let deadline = Instant::now() + Duration::from_secs(1);
        assert!(ProcessRunner::new().run(&spec, deadline).await.is_err());
    }
}
