use acb::config::{CredentialConfig, RawStep, RawTaskFile, validate_task};
use acb::task::Task;

/// Builder for [`RawTaskFile`] to simplify test setup.
#[derive(Debug, Default)]
pub struct TaskFileBuilder {
    file: RawTaskFile,
}

impl TaskFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: StepBuilder) -> Self {
        self.file.steps.push(step.build());
        self
    }

    pub fn step_timeout(mut self, secs: u64) -> Self {
        self.file.step_timeout = Some(secs);
        self
    }

    pub fn total_timeout(mut self, secs: u64) -> Self {
        self.file.total_timeout = Some(secs);
        self
    }

    pub fn registry(mut self, registry: &str) -> Self {
        self.file.registry = Some(registry.to_string());
        self
    }

    pub fn push(mut self, image: &str) -> Self {
        self.file.push.push(image.to_string());
        self
    }

    pub fn credential(mut self, registry: &str, username: &str, password: &str) -> Self {
        self.file.credentials.push(CredentialConfig {
            registry: registry.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn build_raw(self) -> RawTaskFile {
        self.file
    }

    /// Normalise and validate; panics on an invalid document.
    pub fn build(self) -> Task {
        validate_task(self.file).expect("Failed to build valid task from builder")
    }
}

/// Builder for [`RawStep`].
#[derive(Debug)]
pub struct StepBuilder {
    step: RawStep,
}

impl StepBuilder {
    /// A `cmd` step running `alpine true`.
    pub fn cmd(id: &str) -> Self {
        Self::cmd_line(id, "alpine true")
    }

    pub fn cmd_line(id: &str, line: &str) -> Self {
        Self {
            step: RawStep {
                id: id.to_string(),
                cmd: Some(line.to_string()),
                ..RawStep::default()
            },
        }
    }

    pub fn build_args(id: &str, args: &str) -> Self {
        Self {
            step: RawStep {
                id: id.to_string(),
                build: Some(args.to_string()),
                ..RawStep::default()
            },
        }
    }

    pub fn push(id: &str, images: &[&str]) -> Self {
        Self {
            step: RawStep {
                id: id.to_string(),
                push: Some(images.iter().map(|s| s.to_string()).collect()),
                ..RawStep::default()
            },
        }
    }

    /// Depend on each of `deps`; `&["-"]` runs the step immediately.
    pub fn when(mut self, deps: &[&str]) -> Self {
        self.step.when.extend(deps.iter().map(|s| s.to_string()));
        self
    }

    pub fn when_all(mut self, deps: &[&str]) -> Self {
        self.step.when_all.extend(deps.iter().map(|s| s.to_string()));
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.step.timeout = Some(secs);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.step.retries = retries;
        self
    }

    pub fn retry_delay(mut self, secs: u64) -> Self {
        self.step.retry_delay = Some(secs);
        self
    }

    pub fn start_delay(mut self, secs: u64) -> Self {
        self.step.start_delay = secs;
        self
    }

    pub fn ignore_errors(mut self, val: bool) -> Self {
        self.step.ignore_errors = val;
        self
    }

    pub fn env(mut self, kv: &str) -> Self {
        self.step.env.push(kv.to_string());
        self
    }

    pub fn working_directory(mut self, dir: &str) -> Self {
        self.step.working_directory = Some(dir.to_string());
        self
    }

    pub fn build(self) -> RawStep {
        self.step
    }
}
