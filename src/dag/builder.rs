// src/dag/builder.rs

//! Turn an ordered step list into a [`Dag`].

use std::sync::Arc;

use tracing::debug;

use crate::dag::graph::Dag;
use crate::dag::step::{Dependencies, Step};
use crate::errors::GraphError;

/// Build the graph in a single pass over `steps`, in declaration order.
///
/// - `when = ["-"]` attaches the step to root only.
/// - No declaration attaches it to the previous step (root for the first).
/// - Explicit predecessors must already have been declared.
///
/// Construction stops at the first error.
pub fn build_dag(steps: &[Arc<Step>]) -> Result<Dag, GraphError> {
    let dag = Dag::new();
    let mut previous: Option<&str> = None;

    for step in steps {
        step.validate()?;
        dag.add_vertex(Arc::clone(step))?;

        match &step.dependencies {
            Dependencies::Immediate => {
                dag.add_edge_from_root(&step.id)?;
            }
            Dependencies::Previous => match previous {
                Some(prev) => dag.add_edge(prev, &step.id)?,
                None => dag.add_edge_from_root(&step.id)?,
            },
            Dependencies::Steps(ids) => {
                for dep in ids {
                    if dag.vertex(dep).is_none() || dep == crate::dag::ROOT_ID {
                        return Err(GraphError::UnknownDependency {
                            step: step.id.clone(),
                            dependency: dep.clone(),
                        });
                    }
                    dag.add_edge(dep, &step.id)?;
                }
            }
        }

        debug!(
            step = %step.id,
            degree = dag.degree(&step.id)?,
            "added step to graph"
        );
        previous = Some(&step.id);
    }

    Ok(dag)
}
