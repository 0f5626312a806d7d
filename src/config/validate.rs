// src/config/validate.rs

//! Normalisation of a raw task document into a runnable [`Task`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::model::{CredentialConfig, RawStep, RawTaskFile};
use crate::dag::{Dependencies, RunOptions, Step, StepKind};
use crate::errors::{AcbError, Result};
use crate::image::ImageReference;
use crate::task::{
    DEFAULT_RETRY_DELAY_SECS, DEFAULT_STEP_TIMEOUT_SECS, DEFAULT_TOTAL_TIMEOUT_SECS,
    RegistryCredential, Task, clamp_step_timeout, clamp_total_timeout,
};

impl TryFrom<RawTaskFile> for Task {
    type Error = AcbError;

    fn try_from(raw: RawTaskFile) -> std::result::Result<Self, Self::Error> {
        normalize(raw)
    }
}

fn normalize(raw: RawTaskFile) -> Result<Task> {
    ensure_has_steps(&raw)?;

    let step_timeout = clamp_step_timeout(raw.step_timeout.unwrap_or(DEFAULT_STEP_TIMEOUT_SECS));
    let total_timeout = clamp_total_timeout(
        raw.total_timeout.unwrap_or(DEFAULT_TOTAL_TIMEOUT_SECS),
        step_timeout,
    );

    let registry = raw
        .registry
        .as_deref()
        .map(|r| r.trim().trim_end_matches('/').to_string())
        .filter(|r| !r.is_empty());

    let steps = raw
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            normalize_step(index, step, step_timeout, registry.as_deref()).map(Arc::new)
        })
        .collect::<Result<Vec<_>>>()?;

    let push = parse_images(&raw.push, registry.as_deref())?;
    let credentials = raw
        .credentials
        .iter()
        .map(normalize_credential)
        .collect::<Result<Vec<_>>>()?;

    debug!(
        steps = steps.len(),
        step_timeout_secs = step_timeout.as_secs(),
        total_timeout_secs = total_timeout.as_secs(),
        registry = ?registry,
        "normalised task"
    );

    Ok(Task {
        version: raw.version,
        steps,
        step_timeout,
        total_timeout,
        push,
        registry,
        credentials,
    })
}

fn ensure_has_steps(raw: &RawTaskFile) -> Result<()> {
    if raw.steps.is_empty() {
        return Err(AcbError::ConfigError(
            "task must contain at least one [[steps]] entry".to_string(),
        ));
    }
    Ok(())
}

fn normalize_step(
    index: usize,
    raw: &RawStep,
    default_timeout: Duration,
    registry: Option<&str>,
) -> Result<Step> {
    let id = match raw.id.trim() {
        "" => format!("step_{index}"),
        id => id.to_string(),
    };

    let kind = step_kind(&id, raw, registry)?;
    let dependencies = Dependencies::from_declared(&id, raw.declared_dependencies())?;

    let mut step = Step::new(id, kind, dependencies);
    step.timeout = match raw.timeout {
        Some(secs) => clamp_step_timeout(secs),
        None => default_timeout,
    };
    step.retries = raw.retries;
    step.retry_delay = Duration::from_secs(raw.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_SECS));
    step.start_delay = Duration::from_secs(raw.start_delay);
    step.ignore_errors = raw.ignore_errors;
    step.options = RunOptions {
        working_directory: raw.working_directory.as_ref().map(PathBuf::from),
        entry_point: raw.entry_point.clone(),
        env: raw.env.clone(),
        privileged: raw.privileged,
        user: raw.user.clone(),
        network: raw.network.clone(),
    };
    step.validate()?;
    Ok(step)
}

fn step_kind(id: &str, raw: &RawStep, registry: Option<&str>) -> Result<StepKind> {
    match (&raw.cmd, &raw.build, &raw.push) {
        (Some(cmd), None, None) => {
            let mut tokens = split_args(id, "cmd", cmd)?.into_iter();
            let image = tokens.next().ok_or_else(|| {
                AcbError::ConfigError(format!("step '{id}' has an empty `cmd`"))
            })?;
            Ok(StepKind::Command {
                image: image.parse()?,
                args: tokens.collect(),
            })
        }
        (None, Some(build), None) => {
            let (tags, args) = split_build_args(id, build)?;
            if args.is_empty() {
                return Err(AcbError::ConfigError(format!(
                    "step '{id}' has no build context in `build`"
                )));
            }
            let tags = tags
                .iter()
                .map(|t| qualify(t, registry))
                .collect::<Result<Vec<_>>>()?;
            Ok(StepKind::Build { tags, args })
        }
        (None, None, Some(images)) => {
            if images.is_empty() {
                return Err(AcbError::ConfigError(format!(
                    "step '{id}' has an empty `push` list"
                )));
            }
            Ok(StepKind::Push {
                images: parse_images(images, registry)?,
            })
        }
        (None, None, None) => Err(AcbError::ConfigError(format!(
            "step '{id}' must set one of `cmd`, `build` or `push`"
        ))),
        _ => Err(AcbError::ConfigError(format!(
            "step '{id}' sets more than one of `cmd`, `build` and `push`"
        ))),
    }
}

/// Pull `-t`/`--tag` values out of `docker build` arguments.
fn split_build_args(id: &str, build: &str) -> Result<(Vec<String>, Vec<String>)> {
    let mut tags = Vec::new();
    let mut rest = Vec::new();
    let mut tokens = split_args(id, "build", build)?.into_iter();

    while let Some(token) = tokens.next() {
        match token.as_str() {
            "-t" | "--tag" => {
                let tag = tokens.next().ok_or_else(|| {
                    AcbError::ConfigError(format!("step '{id}': `{token}` needs a value"))
                })?;
                tags.push(tag);
            }
            t if t.starts_with("--tag=") => tags.push(t["--tag=".len()..].to_string()),
            t if t.starts_with("-t") && !t.starts_with("--") => tags.push(t[2..].to_string()),
            _ => rest.push(token),
        }
    }

    Ok((tags, rest))
}

/// Split a command line into arguments the way a POSIX shell would,
/// without any expansion.
///
/// Single quotes are literal. Inside double quotes a backslash only
/// escapes `"` and `\`. Outside quotes a backslash escapes any character.
fn split_args(id: &str, field: &str, line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current: Option<String> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if let Some(arg) = current.take() {
                    args.push(arg);
                }
            }
            '\'' => {
                let arg = current.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => arg.push(c),
                        None => return Err(unterminated(id, field)),
                    }
                }
            }
            '"' => {
                let arg = current.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => arg.push(c),
                            Some(c) => {
                                arg.push('\\');
                                arg.push(c);
                            }
                            None => return Err(unterminated(id, field)),
                        },
                        Some(c) => arg.push(c),
                        None => return Err(unterminated(id, field)),
                    }
                }
            }
            '\\' => {
                let escaped = chars.next().ok_or_else(|| {
                    AcbError::ConfigError(format!("step '{id}': `{field}` ends with a backslash"))
                })?;
                current.get_or_insert_with(String::new).push(escaped);
            }
            c => current.get_or_insert_with(String::new).push(c),
        }
    }
    args.extend(current);
    Ok(args)
}

fn unterminated(id: &str, field: &str) -> AcbError {
    AcbError::ConfigError(format!("step '{id}': unterminated quote in `{field}`"))
}

fn qualify(image: &str, registry: Option<&str>) -> Result<ImageReference> {
    let reference: ImageReference = image.parse()?;
    Ok(match registry {
        Some(registry) => reference.with_default_registry(registry),
        None => reference,
    })
}

fn parse_images(images: &[String], registry: Option<&str>) -> Result<Vec<ImageReference>> {
    images.iter().map(|image| qualify(image, registry)).collect()
}

fn normalize_credential(cfg: &CredentialConfig) -> Result<RegistryCredential> {
    let registry = cfg.registry.trim();
    if registry.is_empty() || cfg.username.is_empty() {
        return Err(AcbError::ConfigError(
            "[[credentials]] entries need a registry and a username".to_string(),
        ));
    }
    Ok(RegistryCredential {
        registry: registry.to_string(),
        username: cfg.username.clone(),
        password: cfg.password.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{MAX_STEP_TIMEOUT_SECS, MIN_STEP_TIMEOUT_SECS, MIN_TOTAL_TIMEOUT_SECS};
    use crate::types::StepStatus;

    fn cmd_step(id: &str) -> RawStep {
        RawStep {
            id: id.to_string(),
            cmd: Some("alpine echo hi".to_string()),
            ..RawStep::default()
        }
    }

    fn task_with(steps: Vec<RawStep>) -> RawTaskFile {
        RawTaskFile {
            steps,
            ..RawTaskFile::default()
        }
    }

    #[test]
    fn empty_task_is_rejected() {
        let err = Task::try_from(RawTaskFile::default()).unwrap_err();
        assert!(matches!(err, AcbError::ConfigError(msg) if msg.contains("at least one")));
    }

    #[test]
    fn defaults_are_applied() {
        let task = Task::try_from(task_with(vec![cmd_step(""), cmd_step("named")])).unwrap();

        assert_eq!(task.steps[0].id, "step_0");
        assert_eq!(task.steps[1].id, "named");
        assert_eq!(task.step_timeout, Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS));
        assert_eq!(task.total_timeout, Duration::from_secs(DEFAULT_TOTAL_TIMEOUT_SECS));
        for step in &task.steps {
            assert_eq!(step.status(), StepStatus::Skipped);
            assert_eq!(step.timeout, task.step_timeout);
            assert!(!step.completion().is_signalled());
        }
    }

    #[test]
    fn timeouts_are_clamped() {
        let mut raw = task_with(vec![
            RawStep {
                timeout: Some(0),
                ..cmd_step("low")
            },
            RawStep {
                timeout: Some(u64::MAX),
                ..cmd_step("high")
            },
        ]);
        raw.step_timeout = Some(0);
        raw.total_timeout = Some(1);

        let task = Task::try_from(raw).unwrap();
        assert_eq!(task.step_timeout, Duration::from_secs(MIN_STEP_TIMEOUT_SECS));
        assert_eq!(task.total_timeout, Duration::from_secs(MIN_TOTAL_TIMEOUT_SECS));
        assert_eq!(task.steps[0].timeout, Duration::from_secs(MIN_STEP_TIMEOUT_SECS));
        assert_eq!(task.steps[1].timeout, Duration::from_secs(MAX_STEP_TIMEOUT_SECS));
    }

    #[test]
    fn total_timeout_is_raised_to_step_timeout() {
        let mut raw = task_with(vec![cmd_step("a")]);
        raw.step_timeout = Some(7200);
        raw.total_timeout = Some(60);

        let task = Task::try_from(raw).unwrap();
        assert_eq!(task.total_timeout, Duration::from_secs(7200));
    }

    #[test]
    fn registry_is_propagated_to_unqualified_images() {
        let mut raw = task_with(vec![
            RawStep {
                id: "build".into(),
                build: Some("-t app:v1 --tag=other.io/app:v1 -f Dockerfile .".into()),
                ..RawStep::default()
            },
            RawStep {
                id: "push".into(),
                push: Some(vec!["app:v1".into()]),
                ..RawStep::default()
            },
        ]);
        raw.registry = Some("myreg.azurecr.io/".into());
        raw.push = vec!["app:latest".into()];

        let task = Task::try_from(raw).unwrap();
        match &task.steps[0].kind {
            StepKind::Build { tags, args } => {
                let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
                assert_eq!(tags, vec!["myreg.azurecr.io/app:v1", "other.io/app:v1"]);
                assert_eq!(args, &vec!["-f", "Dockerfile", "."]);
            }
            other => panic!("expected build step, got {other:?}"),
        }
        match &task.steps[1].kind {
            StepKind::Push { images } => {
                assert_eq!(images[0].to_string(), "myreg.azurecr.io/app:v1");
            }
            other => panic!("expected push step, got {other:?}"),
        }
        assert_eq!(task.push[0].to_string(), "myreg.azurecr.io/app:latest");
    }

    #[test]
    fn step_must_have_exactly_one_payload() {
        let both = RawStep {
            build: Some(".".into()),
            ..cmd_step("both")
        };
        let err = Task::try_from(task_with(vec![both])).unwrap_err();
        assert!(matches!(err, AcbError::ConfigError(msg) if msg.contains("more than one")));

        let none = RawStep {
            id: "none".into(),
            ..RawStep::default()
        };
        let err = Task::try_from(task_with(vec![none])).unwrap_err();
        assert!(matches!(err, AcbError::ConfigError(msg) if msg.contains("must set one")));
    }

    #[test]
    fn when_and_when_all_are_merged() {
        let raw = task_with(vec![
            cmd_step("a"),
            cmd_step("b"),
            RawStep {
                when: vec!["a".into()],
                when_all: vec!["b".into(), "a".into()],
                ..cmd_step("c")
            },
        ]);
        let task = Task::try_from(raw).unwrap();
        assert_eq!(
            task.steps[2].dependencies,
            Dependencies::Steps(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn self_reference_is_rejected() {
        let raw = task_with(vec![RawStep {
            when: vec!["a".into()],
            ..cmd_step("a")
        }]);
        let err = Task::try_from(raw).unwrap_err();
        assert!(matches!(
            err,
            AcbError::Graph(crate::errors::GraphError::SelfReference(id)) if id == "a"
        ));
    }

    #[test]
    fn quoted_arguments_stay_whole() {
        let raw = task_with(vec![RawStep {
            id: "sh".into(),
            cmd: Some(r#"alpine sh -c 'echo a && echo b' "two words" it\'s"#.into()),
            ..RawStep::default()
        }]);
        let task = Task::try_from(raw).unwrap();
        match &task.steps[0].kind {
            StepKind::Command { image, args } => {
                assert_eq!(image.to_string(), "alpine");
                assert_eq!(args, &["sh", "-c", "echo a && echo b", "two words", "it's"]);
            }
            other => panic!("expected a command step, got {other:?}"),
        }
    }

    #[test]
    fn quoted_build_arguments_keep_tags_separate() {
        let raw = task_with(vec![RawStep {
            id: "img".into(),
            build: Some(r#"-t app:v1 --build-arg "MSG=hello world" ."#.into()),
            ..RawStep::default()
        }]);
        let task = Task::try_from(raw).unwrap();
        match &task.steps[0].kind {
            StepKind::Build { tags, args } => {
                assert_eq!(tags.len(), 1);
                assert_eq!(args, &["--build-arg", "MSG=hello world", "."]);
            }
            other => panic!("expected a build step, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let raw = task_with(vec![RawStep {
            id: "bad".into(),
            cmd: Some("alpine sh -c 'echo".into()),
            ..RawStep::default()
        }]);
        let err = Task::try_from(raw).unwrap_err();
        assert!(matches!(err, AcbError::ConfigError(msg) if msg.contains("unterminated quote")));
    }
}
