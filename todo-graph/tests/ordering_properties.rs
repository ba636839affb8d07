use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use todo_graph::{DependencyGraph, Schedule, TodoId, TodoNode};

// Acyclic by construction: todo N may only depend on todos 0..N-1.
fn dag_strategy(max_todos: usize) -> impl Strategy<Value = Vec<TodoNode>> {
    (1..=max_todos).prop_flat_map(|count| {
        let deps = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..count),
            count,
        );
        let dues = proptest::collection::vec(proptest::option::of(0i64..4_000_000_000), count);

        (deps, dues).prop_map(move |(raw_deps, dues)| {
            raw_deps
                .into_iter()
                .zip(dues)
                .enumerate()
                .map(|(i, (potential, due))| {
                    let depends_on: HashSet<u32> = if i == 0 {
                        HashSet::new()
                    } else {
                        potential.into_iter().map(|d| (d % i) as u32).collect()
                    };
                    TodoNode::new(
                        TodoId::new(i as u32),
                        due.and_then(|secs| DateTime::from_timestamp(secs, 0)),
                        depends_on.into_iter().map(TodoId::new).collect(),
                    )
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn every_edge_source_precedes_its_target(nodes in dag_strategy(12)) {
        let graph = DependencyGraph::build(&nodes);

        let order = graph.topological_order().expect("generated graph is acyclic");
        prop_assert_eq!(order.len(), nodes.len());

        let position: HashMap<TodoId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for (from, to) in graph.edges() {
            prop_assert!(position[&from] < position[&to]);
        }
    }

    #[test]
    fn ordering_is_deterministic(nodes in dag_strategy(12)) {
        let mut reversed = nodes.clone();
        reversed.reverse();

        let first = DependencyGraph::build(&nodes).topological_order().unwrap();
        let second = DependencyGraph::build(&reversed).topological_order().unwrap();

        prop_assert_eq!(first, second);
    }

    #[test]
    fn admission_check_accepts_any_existing_dependencies(
        nodes in dag_strategy(12),
        picks in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let graph = DependencyGraph::build(&nodes);
        let proposed: Vec<TodoId> = picks
            .into_iter()
            .map(|p| TodoId::new((p % nodes.len()) as u32))
            .collect();

        prop_assert!(graph.check_insert(&proposed).is_ok());
        prop_assert!(!graph.has_cycle());
    }

    #[test]
    fn earliest_start_is_latest_dependency_due_date(nodes in dag_strategy(12)) {
        let graph = DependencyGraph::build(&nodes);
        let schedule = Schedule::compute(&graph).unwrap();

        for node in &nodes {
            let expected = node
                .depends_on
                .iter()
                .filter_map(|dep| nodes[dep.get() as usize].due_date)
                .fold(DateTime::<Utc>::UNIX_EPOCH, |latest, due| latest.max(due));
            prop_assert_eq!(schedule.earliest_start(node.id), Some(expected));
        }
    }
}
