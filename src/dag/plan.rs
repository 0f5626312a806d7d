// src/dag/plan.rs

//! Static execution plan used by `--dry-run`.

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::graph::{Dag, ROOT_ID};
use crate::errors::GraphError;

/// One line of the plan: a step and the steps it waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub id: String,
    pub waits_for: Vec<String>,
}

/// Order the graph's steps topologically (root excluded).
///
/// The builder never produces cycles; a cycle here means the graph was
/// mutated by hand, and is reported against the offending vertex.
pub fn execution_plan(dag: &Dag) -> Result<Vec<PlannedStep>, GraphError> {
    let edges = dag.edges();
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    graph.add_node(ROOT_ID);
    for (from, to) in &edges {
        graph.add_edge(from.as_str(), to.as_str(), ());
    }

    let order = toposort(&graph, None)
        .map_err(|cycle| GraphError::Cycle(cycle.node_id().to_string()))?;

    Ok(order
        .into_iter()
        .filter(|id| *id != ROOT_ID)
        .map(|id| {
            let mut waits_for: Vec<String> = graph
                .neighbors_directed(id, petgraph::Direction::Incoming)
                .filter(|p| *p != ROOT_ID)
                .map(str::to_string)
                .collect();
            waits_for.sort();
            PlannedStep {
                id: id.to_string(),
                waits_for,
            }
        })
        .collect())
}
