// tests/login_and_push.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use acb::engine::{Executor, ExecutorOptions};
use acb::errors::AcbError;
use acb::types::StepStatus;
use acb_test_utils::{FakeRunner, StaticDigests, StepBuilder, TaskFileBuilder, init_tracing};

const REGISTRY: &str = "myreg.azurecr.io";
const LOGIN: &str = "login:myreg.azurecr.io";

fn executor(runner: &FakeRunner, digests: StaticDigests) -> Executor {
    Executor::new(
        Arc::new(runner.clone()),
        Arc::new(digests),
        ExecutorOptions::default(),
    )
}

fn build_then_push() -> TaskFileBuilder {
    TaskFileBuilder::new()
        .registry(REGISTRY)
        .credential(REGISTRY, "ci", "s3cret")
        .step(StepBuilder::build_args("build", "-t app:v1 ."))
        .step(StepBuilder::push("publish", &["app:v1"]))
}

#[tokio::test(start_paused = true)]
async fn push_step_logs_in_before_pushing() {
    init_tracing();

    let task = build_then_push().build();
    let runner = FakeRunner::new();

    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    assert!(summary.succeeded(), "run failed: {:?}", summary.error);
    assert_eq!(runner.names(), vec!["build", LOGIN, "publish"]);

    let login = &runner.calls_for(LOGIN)[0];
    assert_eq!(login.stdin.as_deref(), Some("s3cret"));
    assert!(!login.argv.iter().any(|a| a.contains("s3cret")));

    let push = &runner.calls_for("publish")[0];
    assert_eq!(push.argv, vec!["docker", "push", "myreg.azurecr.io/app:v1"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_push_steps_share_one_login() {
    init_tracing();

    let task = TaskFileBuilder::new()
        .registry(REGISTRY)
        .credential(REGISTRY, "ci", "s3cret")
        .step(StepBuilder::push("p1", &["one:v1"]).when(&["-"]))
        .step(StepBuilder::push("p2", &["two:v1"]).when(&["-"]))
        .build();
    let runner = FakeRunner::new().delay(LOGIN, Duration::from_secs(1));

    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    assert!(summary.succeeded());
    assert_eq!(runner.count(LOGIN), 1);
    assert_eq!(runner.count("p1"), 1);
    assert_eq!(runner.count("p2"), 1);
}

#[tokio::test(start_paused = true)]
async fn logins_to_different_registries_run_in_parallel() {
    init_tracing();

    let task = TaskFileBuilder::new()
        .credential("one.example.com", "ci", "first")
        .credential("two.example.com", "ci", "second")
        .step(StepBuilder::push("p1", &["one.example.com/app:v1"]).when(&["-"]))
        .step(StepBuilder::push("p2", &["two.example.com/app:v1"]).when(&["-"]))
        .build();
    let runner = FakeRunner::new()
        .delay("login:one.example.com", Duration::from_secs(5))
        .delay("login:two.example.com", Duration::from_secs(5));

    let started = Instant::now();
    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    assert!(summary.succeeded(), "run failed: {:?}", summary.error);
    let one = &runner.calls_for("login:one.example.com")[0];
    let two = &runner.calls_for("login:two.example.com")[0];
    assert!(two.started < one.finished.unwrap());
    assert!(one.started < two.finished.unwrap());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(runner.max_concurrency(), 2);
}

#[tokio::test(start_paused = true)]
async fn no_login_without_credentials() {
    init_tracing();

    let task = TaskFileBuilder::new()
        .step(StepBuilder::push("publish", &["app:v1"]))
        .build();
    let runner = FakeRunner::new();

    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    assert!(summary.succeeded());
    assert_eq!(runner.names(), vec!["publish"]);
}

#[tokio::test(start_paused = true)]
async fn login_is_retried_with_delay() {
    init_tracing();

    let task = build_then_push().build();
    let runner = FakeRunner::new().fail_times(LOGIN, 2);

    let started = Instant::now();
    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    assert!(summary.succeeded(), "run failed: {:?}", summary.error);
    assert_eq!(runner.count(LOGIN), 3);
    assert_eq!(runner.count("publish"), 1);
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn login_failure_fails_the_push_step() {
    init_tracing();

    let task = build_then_push().build();
    let runner = FakeRunner::new().always_fail(LOGIN);

    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    match &summary.error {
        Some(AcbError::StepFailed { step, source }) => {
            assert_eq!(step, "publish");
            match source.as_ref() {
                AcbError::LoginFailed {
                    registry, attempts, ..
                } => {
                    assert_eq!(registry, REGISTRY);
                    assert_eq!(*attempts, 3);
                }
                other => panic!("expected LoginFailed, got {other:?}"),
            }
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(runner.count(LOGIN), 3);
    assert_eq!(runner.count("publish"), 0);
    assert_eq!(summary.step("build").unwrap().status, StepStatus::Successful);
    assert_eq!(summary.step("publish").unwrap().status, StepStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn task_push_list_runs_after_all_steps() {
    init_tracing();

    let task = TaskFileBuilder::new()
        .registry(REGISTRY)
        .credential(REGISTRY, "ci", "s3cret")
        .push("app:v1")
        .step(StepBuilder::build_args("build", "-t app:v1 ."))
        .step(StepBuilder::cmd("test").when(&["-"]))
        .build();
    let runner = FakeRunner::new()
        .delay("build", Duration::from_secs(1))
        .delay("test", Duration::from_secs(2));

    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    assert!(summary.succeeded(), "run failed: {:?}", summary.error);
    let push = &runner.calls_for("push:myreg.azurecr.io/app:v1")[0];
    for step in ["build", "test"] {
        let finished = runner.calls_for(step)[0].finished.unwrap();
        assert!(finished <= push.started, "{step} finished after the push started");
    }
    assert_eq!(runner.count(LOGIN), 1);
}

#[tokio::test(start_paused = true)]
async fn push_phase_stops_at_first_failure() {
    init_tracing();

    let task = TaskFileBuilder::new()
        .push("a:1")
        .push("b:1")
        .step(StepBuilder::cmd("only"))
        .build();
    let runner = FakeRunner::new().always_fail("push:a:1");

    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    match &summary.error {
        Some(AcbError::PushFailed { image, .. }) => assert_eq!(image, "a:1"),
        other => panic!("expected PushFailed, got {other:?}"),
    }
    assert_eq!(runner.count("push:b:1"), 0);
    assert_eq!(summary.step("only").unwrap().status, StepStatus::Successful);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_pushed_after_a_step_failure() {
    init_tracing();

    let task = TaskFileBuilder::new()
        .push("app:v1")
        .step(StepBuilder::cmd("broken"))
        .build();
    let runner = FakeRunner::new().always_fail("broken");

    let summary = executor(&runner, StaticDigests::new()).run(&task).await;

    assert!(!summary.succeeded());
    assert_eq!(runner.count("push:app:v1"), 0);
}

#[tokio::test(start_paused = true)]
async fn digests_are_populated_for_successful_steps() {
    init_tracing();

    let digest = format!("sha256:{}", "ab".repeat(32));
    let task = TaskFileBuilder::new()
        .registry(REGISTRY)
        .step(StepBuilder::build_args("build", "-t app:v1 -t app:latest .").when(&["-"]))
        .step(StepBuilder::cmd_line("broken", "alpine false").when(&["-"]))
        .step(StepBuilder::cmd_line("pinned", &format!("alpine@{digest} true")).when(&["-"]))
        .build();
    let runner = FakeRunner::new()
        .delay("broken", Duration::from_secs(1))
        .always_fail("broken");
    let digests = StaticDigests::new()
        .with("myreg.azurecr.io/app:v1", "sha256:111")
        .broken("myreg.azurecr.io/app:latest");

    let summary = executor(&runner, digests).run(&task).await;

    assert!(!summary.succeeded());

    let build = summary.step("build").unwrap();
    assert_eq!(build.images.len(), 2);
    assert_eq!(build.images[0].reference.to_string(), "myreg.azurecr.io/app:v1");
    assert_eq!(build.images[0].digest.as_deref(), Some("sha256:111"));
    assert_eq!(build.images[1].digest, None);

    let pinned = summary.step("pinned").unwrap();
    assert_eq!(pinned.images[0].digest.as_deref(), Some(digest.as_str()));

    assert!(summary.step("broken").unwrap().images.is_empty());
}
