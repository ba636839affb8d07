use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;

/// Identifier of a todo inside the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TodoId(u32);

impl TodoId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric id.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for TodoId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by graph admission checks and ordering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The graph (or the hypothetical graph of a pending insert) has a cycle.
    /// `node` is a todo on or behind the cycle; `None` means the pending todo.
    #[error("Circular dependency detected")]
    CycleDetected { node: Option<TodoId> },
    /// A proposed dependency does not name a todo in the graph.
    #[error("Unknown dependency {0}")]
    UnknownDependency(TodoId),
}

/// A todo as seen by the graph: its id, due date and outbound dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoNode {
    pub id: TodoId,
    pub due_date: Option<DateTime<Utc>>,
    /// Todos that must happen before this one.
    pub depends_on: Vec<TodoId>,
}

impl TodoNode {
    pub fn new(id: TodoId, due_date: Option<DateTime<Utc>>, depends_on: Vec<TodoId>) -> Self {
        Self {
            id,
            due_date,
            depends_on,
        }
    }
}

/// Directed graph of todo ids.
///
/// Edge direction is "must happen before": an edge `a -> b` means `b`
/// depends on `a`. The graph is rebuilt from the full todo set whenever it is
/// needed and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<TodoId, ()>,
    due_dates: HashMap<TodoId, DateTime<Utc>>,
}

impl DependencyGraph {
    /// Builds a graph with one node per todo and one edge per dependency.
    ///
    /// Dependencies that point at a todo outside the given set are dropped.
    /// Repeated dependencies collapse into a single edge.
    pub fn build<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = &'a TodoNode>,
    {
        let nodes: Vec<&TodoNode> = nodes.into_iter().collect();
        let mut graph = DiGraphMap::with_capacity(nodes.len(), 0);
        let mut due_dates = HashMap::new();

        for node in &nodes {
            graph.add_node(node.id);
            if let Some(due_date) = node.due_date {
                due_dates.insert(node.id, due_date);
            }
        }

        for node in &nodes {
            for &dependency in &node.depends_on {
                if !graph.contains_node(dependency) {
                    tracing::debug!(
                        "Dropping dependency of todo {} on missing todo {}",
                        node.id,
                        dependency
                    );
                    continue;
                }
                graph.add_edge(dependency, node.id, ());
            }
        }

        Self { graph, due_dates }
    }

    /// Returns whether the graph contains a todo with the given id.
    pub fn contains(&self, id: TodoId) -> bool {
        self.graph.contains_node(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node ids in the order the todos were given to [`DependencyGraph::build`].
    pub fn nodes(&self) -> impl Iterator<Item = TodoId> + '_ {
        self.graph.nodes()
    }

    /// All edges as `(depends_on, dependent)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (TodoId, TodoId)> + '_ {
        self.graph.all_edges().map(|(from, to, _)| (from, to))
    }

    /// Direct predecessors of a todo, ascending.
    pub fn dependencies_of(&self, id: TodoId) -> Vec<TodoId> {
        self.sorted_neighbors(id, Direction::Incoming)
    }

    /// Direct successors of a todo, ascending.
    pub fn dependents_of(&self, id: TodoId) -> Vec<TodoId> {
        self.sorted_neighbors(id, Direction::Outgoing)
    }

    pub fn due_date(&self, id: TodoId) -> Option<DateTime<Utc>> {
        self.due_dates.get(&id).copied()
    }

    /// Returns whether the graph contains a directed cycle.
    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Checks whether a new todo depending on `dependencies` can be added.
    ///
    /// The check runs on a copy of the graph extended with one pending node
    /// and an edge from every proposed dependency to it; `self` is left
    /// untouched. Every dependency must already be a node.
    pub fn check_insert(&self, dependencies: &[TodoId]) -> Result<(), GraphError> {
        if let Some(&unknown) = dependencies.iter().find(|id| !self.contains(**id)) {
            return Err(GraphError::UnknownDependency(unknown));
        }

        // `None` stands for the pending todo, which has no id yet.
        let mut hypothetical: DiGraphMap<Option<TodoId>, ()> = DiGraphMap::with_capacity(
            self.graph.node_count() + 1,
            self.graph.edge_count() + dependencies.len(),
        );
        for node in self.graph.nodes() {
            hypothetical.add_node(Some(node));
        }
        for (from, to, _) in self.graph.all_edges() {
            hypothetical.add_edge(Some(from), Some(to), ());
        }
        hypothetical.add_node(None);
        for &dependency in dependencies {
            hypothetical.add_edge(Some(dependency), None, ());
        }

        toposort(&hypothetical, None)
            .map(|_| ())
            .map_err(|cycle| GraphError::CycleDetected {
                node: cycle.node_id(),
            })
    }

    /// Returns every todo id ordered so that dependencies precede dependents.
    ///
    /// When several todos are free to go next, the smallest id goes first, so
    /// the order is stable for a given graph. Fails with
    /// [`GraphError::CycleDetected`] naming the smallest id that could not be
    /// placed if the graph is cyclic.
    pub fn topological_order(&self) -> Result<Vec<TodoId>, GraphError> {
        let mut in_degree: HashMap<TodoId, usize> =
            self.graph.nodes().map(|node| (node, 0)).collect();
        let mut successors: HashMap<TodoId, Vec<TodoId>> = HashMap::new();
        for (from, to, _) in self.graph.all_edges() {
            *in_degree.entry(to).or_default() += 1;
            successors.entry(from).or_default().push(to);
        }

        let mut ready: BinaryHeap<Reverse<TodoId>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| Reverse(*node))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for next in successors.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(*next));
                    }
                }
            }
        }

        if order.len() < in_degree.len() {
            let node = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(node, _)| node)
                .min();
            return Err(GraphError::CycleDetected { node });
        }
        Ok(order)
    }

    fn sorted_neighbors(&self, id: TodoId, direction: Direction) -> Vec<TodoId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut neighbors: Vec<TodoId> = self.graph.neighbors_directed(id, direction).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }
}
