use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::graph::{DependencyGraph, GraphError, TodoId};

/// Topological order of a graph together with each todo's earliest start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    order: Vec<TodoId>,
    earliest_start: HashMap<TodoId, DateTime<Utc>>,
}

impl Schedule {
    /// Computes the schedule in one pass over the topological order.
    ///
    /// A todo's earliest start is the latest due date among its direct
    /// dependencies, or the Unix epoch when it has none (dependencies without
    /// a due date count as the epoch too).
    #[tracing::instrument(skip(graph), fields(nodes = graph.node_count()))]
    pub fn compute(graph: &DependencyGraph) -> Result<Self, GraphError> {
        let order = graph.topological_order()?;
        let mut earliest_start = HashMap::with_capacity(order.len());

        for &node in &order {
            let start = graph
                .dependencies_of(node)
                .into_iter()
                .filter_map(|dependency| graph.due_date(dependency))
                .fold(DateTime::<Utc>::UNIX_EPOCH, |latest, due| latest.max(due));
            earliest_start.insert(node, start);
        }

        Ok(Self {
            order,
            earliest_start,
        })
    }

    pub fn order(&self) -> &[TodoId] {
        &self.order
    }

    /// Earliest start of a todo, or `None` if it was not in the graph.
    pub fn earliest_start(&self, id: TodoId) -> Option<DateTime<Utc>> {
        self.earliest_start.get(&id).copied()
    }

    /// The order rendered as `1 -> 2 -> 3`.
    pub fn critical_path(&self) -> String {
        self.order
            .iter()
            .map(TodoId::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
