//! Task graph types submitted to task-graph scheduling backends.

use crate::ids::{BuilderName, RepoName, RequestId, Revision, TaskId};
use serde::{Deserialize, Serialize};

/// A single task of a task graph. `requires` lists tasks that must finish first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub task_id: TaskId,
    pub builder: BuilderName,
    pub requires: Vec<TaskId>,
    pub payload: serde_json::Value,
}

/// A graph of tasks for one (repository, revision), in topological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub graph_id: TaskId,
    pub repo: RepoName,
    pub revision: Revision,
    pub tasks: Vec<TaskNode>,
}

impl TaskGraph {
    pub fn task(&self, builder: &BuilderName) -> Option<&TaskNode> {
        self.tasks.iter().find(|t| &t.builder == builder)
    }
}

/// Response of a task-graph backend to a graph submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphResult {
    pub graph_id: RequestId,
    pub task_count: usize,
    pub http_status: u16,
    #[serde(default)]
    pub dry_run: bool,
}
