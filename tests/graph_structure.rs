// tests/graph_structure.rs

use std::collections::BTreeSet;

use acb::config::validate_task;
use acb::dag::{ROOT_ID, execution_plan};
use acb::errors::{AcbError, GraphError};
use acb_test_utils::{StepBuilder, TaskFileBuilder};

fn child_ids(dag: &acb::dag::Dag, id: &str) -> BTreeSet<String> {
    dag.children(id)
        .unwrap()
        .iter()
        .map(|n| n.id().to_string())
        .collect()
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Seven steps mixing immediate execution, explicit predecessors and
/// default chaining.
#[test]
fn seven_step_task_builds_expected_graph() {
    let task = TaskFileBuilder::new()
        .step(StepBuilder::cmd("puller"))
        .step(StepBuilder::cmd("C").when(&["-"]))
        .step(StepBuilder::cmd("B").when(&["C"]))
        .step(StepBuilder::build_args("build-qux", "-t qux .").when(&["-"]))
        .step(StepBuilder::build_args("build-foo", "-t foo .").when(&["build-qux"]))
        .step(StepBuilder::build_args("build-qaz", "-t qaz ."))
        .step(StepBuilder::build_args("build-bar", "-t bar .").when(&["-"]))
        .build();

    let dag = task.build_dag().unwrap();

    assert_eq!(dag.len(), 7);
    assert_eq!(
        child_ids(&dag, ROOT_ID),
        set(&["puller", "C", "build-qux", "build-bar"])
    );
    assert_eq!(child_ids(&dag, "C"), set(&["B"]));
    assert_eq!(child_ids(&dag, "build-qux"), set(&["build-foo"]));
    assert_eq!(child_ids(&dag, "build-foo"), set(&["build-qaz"]));
    for leaf in ["B", "build-bar", "build-qaz", "puller"] {
        assert!(child_ids(&dag, leaf).is_empty(), "{leaf} should be a leaf");
    }

    for id in ["puller", "C", "B", "build-qux", "build-foo", "build-qaz", "build-bar"] {
        assert_eq!(dag.degree(id).unwrap(), 1, "{id} has exactly one predecessor");
    }
}

#[test]
fn immediate_step_never_chains_to_previous() {
    let task = TaskFileBuilder::new()
        .step(StepBuilder::cmd("first"))
        .step(StepBuilder::cmd("second").when(&["-"]))
        .build();
    let dag = task.build_dag().unwrap();

    assert!(child_ids(&dag, "first").is_empty());
    assert_eq!(child_ids(&dag, ROOT_ID), set(&["first", "second"]));
}

#[test]
fn default_chaining_follows_declaration_order() {
    let task = TaskFileBuilder::new()
        .step(StepBuilder::cmd("a"))
        .step(StepBuilder::cmd("b"))
        .step(StepBuilder::cmd("c"))
        .build();
    let dag = task.build_dag().unwrap();

    assert_eq!(child_ids(&dag, ROOT_ID), set(&["a"]));
    assert_eq!(child_ids(&dag, "a"), set(&["b"]));
    assert_eq!(child_ids(&dag, "b"), set(&["c"]));
}

#[test]
fn fan_in_step_counts_every_predecessor() {
    let task = TaskFileBuilder::new()
        .step(StepBuilder::cmd("a").when(&["-"]))
        .step(StepBuilder::cmd("b").when(&["-"]))
        .step(StepBuilder::cmd("c").when(&["-"]))
        .step(StepBuilder::cmd("join").when(&["a", "b"]).when_all(&["c", "a"]))
        .build();
    let dag = task.build_dag().unwrap();

    assert_eq!(dag.degree("join").unwrap(), 3);
}

#[test]
fn forward_reference_is_rejected() {
    let raw = TaskFileBuilder::new()
        .step(StepBuilder::cmd("a").when(&["b"]))
        .step(StepBuilder::cmd("b"))
        .build_raw();

    match validate_task(raw) {
        Err(AcbError::Graph(GraphError::UnknownDependency { step, dependency })) => {
            assert_eq!(step, "a");
            assert_eq!(dependency, "b");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn duplicate_step_is_rejected() {
    let raw = TaskFileBuilder::new()
        .step(StepBuilder::cmd("a"))
        .step(StepBuilder::cmd("a"))
        .build_raw();

    assert!(matches!(
        validate_task(raw),
        Err(AcbError::Graph(GraphError::DuplicateStep(id))) if id == "a"
    ));
}

#[test]
fn reserved_step_id_is_rejected() {
    let raw = TaskFileBuilder::new()
        .step(StepBuilder::cmd(ROOT_ID))
        .build_raw();

    assert!(matches!(
        validate_task(raw),
        Err(AcbError::Graph(GraphError::ReservedStepId(_)))
    ));
}

#[test]
fn depending_on_root_is_rejected() {
    let raw = TaskFileBuilder::new()
        .step(StepBuilder::cmd("a").when(&[ROOT_ID]))
        .build_raw();

    assert!(matches!(
        validate_task(raw),
        Err(AcbError::Graph(GraphError::UnknownDependency { .. }))
    ));
}

#[test]
fn sentinel_mixed_with_dependencies_is_rejected() {
    let raw = TaskFileBuilder::new()
        .step(StepBuilder::cmd("a"))
        .step(StepBuilder::cmd("b").when(&["-", "a"]))
        .build_raw();

    assert!(matches!(
        validate_task(raw),
        Err(AcbError::Graph(GraphError::MisplacedSentinel(id))) if id == "b"
    ));
}

#[test]
fn plan_orders_every_step_after_its_predecessors() {
    let task = TaskFileBuilder::new()
        .step(StepBuilder::cmd("puller"))
        .step(StepBuilder::cmd("C").when(&["-"]))
        .step(StepBuilder::cmd("B").when(&["C"]))
        .step(StepBuilder::cmd("D").when(&["B", "puller"]))
        .build();
    let plan = execution_plan(&task.build_dag().unwrap()).unwrap();

    let position = |id: &str| plan.iter().position(|p| p.id == id).unwrap();
    assert_eq!(plan.len(), 4);
    for planned in &plan {
        for dep in &planned.waits_for {
            assert!(position(dep) < position(&planned.id), "{dep} before {}", planned.id);
        }
    }

    let d = &plan[position("D")];
    assert_eq!(d.waits_for, vec!["B".to_string(), "puller".to_string()]);
}
