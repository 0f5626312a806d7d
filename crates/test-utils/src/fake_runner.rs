use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use acb::errors::{AcbError, Result};
use acb::exec::{BoxFuture, CommandRunner, CommandSpec, DigestResolver};
use acb::image::ImageReference;
use tokio::time::Instant;

/// One call made against a [`FakeRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub name: String,
    pub argv: Vec<String>,
    pub stdin: Option<String>,
    pub started: Instant,
    /// `None` while the call is still running (or was dropped mid-flight).
    pub finished: Option<Instant>,
}

#[derive(Debug, Default, Clone)]
struct Behaviour {
    delay: Duration,
    fail_times: u32,
    always_fail: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<RecordedCall>,
    behaviours: HashMap<String, Behaviour>,
    failures: HashMap<String, u32>,
    running: usize,
    max_running: usize,
}

/// A fake command runner that:
/// - records every call with its start and end instants
/// - sleeps for a per-name delay (bounded by the call's deadline)
/// - fails the first N calls for a name, or every call.
///
/// Calls are keyed by [`CommandSpec::name`]: the step ID for step commands,
/// `login:<registry>` and `push:<image>` otherwise. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn delay(self, name: &str, delay: Duration) -> Self {
        self.state().behaviours.entry(name.to_string()).or_default().delay = delay;
        self
    }

    /// Fail the first `n` calls for `name`, then succeed.
    pub fn fail_times(self, name: &str, n: u32) -> Self {
        self.state()
            .behaviours
            .entry(name.to_string())
            .or_default()
            .fail_times = n;
        self
    }

    pub fn always_fail(self, name: &str) -> Self {
        self.state()
            .behaviours
            .entry(name.to_string())
            .or_default()
            .always_fail = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn calls_for(&self, name: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.state().calls.iter().filter(|c| c.name == name).count()
    }

    /// Names in the order their calls started.
    pub fn names(&self) -> Vec<String> {
        self.state().calls.iter().map(|c| c.name.clone()).collect()
    }

    /// Calls currently in flight. Dropped calls are no longer counted.
    pub fn running(&self) -> usize {
        self.state().running
    }

    /// Highest number of calls that were in flight at once.
    pub fn max_concurrency(&self) -> usize {
        self.state().max_running
    }

    async fn execute(&self, spec: &CommandSpec, deadline: Instant) -> Result<()> {
        let (index, behaviour, fail) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let index = state.calls.len();
            state.calls.push(RecordedCall {
                name: spec.name.clone(),
                argv: spec.argv.clone(),
                stdin: spec.stdin.clone(),
                started: Instant::now(),
                finished: None,
            });
            state.running += 1;
            state.max_running = state.max_running.max(state.running);

            let behaviour = state.behaviours.get(&spec.name).cloned().unwrap_or_default();
            let failures = state.failures.entry(spec.name.clone()).or_default();
            let fail = behaviour.always_fail || *failures < behaviour.fail_times;
            if fail {
                *failures += 1;
            }
            (index, behaviour, fail)
        };

        let _guard = RunningGuard {
            state: Arc::clone(&self.state),
        };

        let due = Instant::now() + behaviour.delay;
        if due > deadline {
            tokio::time::sleep_until(deadline).await;
            self.finish(index);
            return Err(AcbError::CommandTimedOut);
        }
        if !behaviour.delay.is_zero() {
            tokio::time::sleep_until(due).await;
        }
        self.finish(index);

        if fail {
            Err(AcbError::CommandFailed { exit_code: 1 })
        } else {
            Ok(())
        }
    }

    fn finish(&self, index: usize) {
        if let Some(call) = self.state().calls.get_mut(index) {
            call.finished = Some(Instant::now());
        }
    }
}

struct RunningGuard {
    state: Arc<Mutex<FakeState>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.running = state.running.saturating_sub(1);
    }
}

impl CommandRunner for FakeRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec, deadline: Instant) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.execute(spec, deadline))
    }
}

/// Digest resolver backed by a fixed map of `image reference -> digest`.
#[derive(Debug, Clone, Default)]
pub struct StaticDigests {
    digests: HashMap<String, String>,
    broken: Vec<String>,
}

impl StaticDigests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, image: &str, digest: &str) -> Self {
        self.digests.insert(image.to_string(), digest.to_string());
        self
    }

    /// Lookups for `image` return an error.
    pub fn broken(mut self, image: &str) -> Self {
        self.broken.push(image.to_string());
        self
    }
}

impl DigestResolver for StaticDigests {
    fn resolve<'a>(&'a self, image: &'a ImageReference) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let key = image.to_string();
            if self.broken.contains(&key) {
                return Err(AcbError::Other(anyhow::anyhow!("inspect failed for {key}")));
            }
            Ok(self.digests.get(&key).cloned())
        })
    }
}
