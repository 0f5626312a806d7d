// src/exec/command.rs

//! Translate step payloads into docker command lines.

use crate::dag::{Step, StepKind};
use crate::exec::backend::CommandSpec;
use crate::image::ImageReference;
use crate::task::RegistryCredential;

/// The commands that make up one attempt of `step`, run in order.
pub fn step_commands(step: &Step, docker: &str) -> Vec<CommandSpec> {
    match &step.kind {
        StepKind::Command { image, args } => vec![run_command(step, image, args, docker)],
        StepKind::Build { tags, args } => vec![build_command(step, tags, args, docker)],
        StepKind::Push { images } => images
            .iter()
            .map(|image| {
                let mut spec = push_command(image, docker);
                spec.name = step.id.clone();
                spec
            })
            .collect(),
    }
}

fn run_command(step: &Step, image: &ImageReference, args: &[String], docker: &str) -> CommandSpec {
    let opts = &step.options;
    let mut argv = vec![
        docker.to_string(),
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        step.id.clone(),
    ];
    if opts.privileged {
        argv.push("--privileged".to_string());
    }
    if let Some(user) = &opts.user {
        argv.extend(["--user".to_string(), user.clone()]);
    }
    if let Some(network) = &opts.network {
        argv.extend(["--network".to_string(), network.clone()]);
    }
    for env in &opts.env {
        argv.extend(["--env".to_string(), env.clone()]);
    }
    if let Some(dir) = &opts.working_directory {
        argv.extend(["--workdir".to_string(), dir.display().to_string()]);
    }
    if let Some(entry_point) = &opts.entry_point {
        argv.extend(["--entrypoint".to_string(), entry_point.clone()]);
    }
    argv.push(image.to_string());
    argv.extend(args.iter().cloned());

    CommandSpec::new(step.id.clone(), argv)
}

fn build_command(
    step: &Step,
    tags: &[ImageReference],
    args: &[String],
    docker: &str,
) -> CommandSpec {
    let mut argv = vec![docker.to_string(), "build".to_string()];
    for tag in tags {
        argv.extend(["--tag".to_string(), tag.to_string()]);
    }
    if let Some(network) = &step.options.network {
        argv.extend(["--network".to_string(), network.clone()]);
    }
    argv.extend(args.iter().cloned());

    let mut spec = CommandSpec::new(step.id.clone(), argv);
    spec.working_dir = step.options.working_directory.clone();
    spec
}

pub fn push_command(image: &ImageReference, docker: &str) -> CommandSpec {
    CommandSpec::new(
        format!("push:{image}"),
        vec![docker.to_string(), "push".to_string(), image.to_string()],
    )
}

/// `docker login`, with the password fed through stdin.
pub fn login_command(credential: &RegistryCredential, docker: &str) -> CommandSpec {
    let mut spec = CommandSpec::new(
        format!("login:{}", credential.registry),
        vec![
            docker.to_string(),
            "login".to_string(),
            "--username".to_string(),
            credential.username.clone(),
            "--password-stdin".to_string(),
            credential.registry.clone(),
        ],
    );
    spec.stdin = Some(credential.password.clone());
    spec
}
