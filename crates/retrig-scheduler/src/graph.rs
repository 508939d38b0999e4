//! Builders graph to task graph conversion.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use retrig_core::task::{TaskGraph, TaskNode};
use retrig_core::{BuilderName, Error, RepoName, Revision, TaskId};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Build builders mapped to the test builders that consume their artifacts.
/// A build without tests maps to an empty list.
pub type BuildersGraph = BTreeMap<BuilderName, Vec<BuilderName>>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Cycle detected in builder dependencies")]
    CycleDetected,
    #[error("Empty builders graph")]
    EmptyGraph,
}

impl From<GraphError> for Error {
    fn from(err: GraphError) -> Self {
        Error::InvalidGraph(err.to_string())
    }
}

/// Generate a task graph scheduling every builder of `builders` on one revision.
///
/// Each test task requires the task of its build. Tasks come out in topological
/// order; `files` and `extra_properties` go to tasks without requirements.
pub fn generate_task_graph(
    repo: &RepoName,
    revision: &Revision,
    builders: &BuildersGraph,
    files: &[String],
    extra_properties: Option<&serde_json::Value>,
) -> Result<TaskGraph, GraphError> {
    if builders.is_empty() {
        return Err(GraphError::EmptyGraph);
    }

    let mut graph: DiGraph<BuilderName, ()> = DiGraph::new();
    let mut name_to_index: HashMap<BuilderName, NodeIndex> = HashMap::new();
    let mut node = |graph: &mut DiGraph<BuilderName, ()>, name: &BuilderName| {
        *name_to_index
            .entry(name.clone())
            .or_insert_with(|| graph.add_node(name.clone()))
    };

    for (build, tests) in builders {
        let build_idx = node(&mut graph, build);
        for test in tests {
            let test_idx = node(&mut graph, test);
            graph.update_edge(build_idx, test_idx, ());
        }
    }

    let order = toposort(&graph, None).map_err(|_| GraphError::CycleDetected)?;
    let task_ids: HashMap<NodeIndex, TaskId> =
        graph.node_indices().map(|idx| (idx, TaskId::new())).collect();

    let tasks = order
        .into_iter()
        .map(|idx| {
            let requires: Vec<TaskId> = graph
                .neighbors_directed(idx, petgraph::Direction::Incoming)
                .map(|parent| task_ids[&parent])
                .collect();
            let mut payload = json!({
                "buildername": graph[idx].as_str(),
                "sourcestamp": {
                    "branch": repo.as_str(),
                    "revision": revision.as_str(),
                },
            });
            if requires.is_empty() {
                payload["files"] = json!(files);
                if let Some(extra) = extra_properties {
                    payload["properties"] = extra.clone();
                }
            }
            TaskNode {
                task_id: task_ids[&idx],
                builder: graph[idx].clone(),
                requires,
                payload,
            }
        })
        .collect();

    Ok(TaskGraph {
        graph_id: TaskId::new(),
        repo: repo.clone(),
        revision: revision.clone(),
        tasks,
    })
}
