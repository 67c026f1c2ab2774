use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use super::{DependencyGraph, NodeIndex};

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Circular dependency detected between modules: {}", .0.join(", "))]
pub struct CycleError(pub Vec<String>);

/// Dependencies-first order of every node in `graph`.
///
/// Among nodes that are free to go next, the one discovered first wins, so the
/// same graph always yields the same order.
pub fn topological_order(graph: &DependencyGraph) -> Result<Vec<NodeIndex>, CycleError> {
    let mut in_degree: BTreeMap<NodeIndex, usize> = graph
        .nodes()
        .map(|(index, node)| (index, node.dependencies().count()))
        .collect();
    let mut ready: BTreeSet<NodeIndex> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| *index)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(index) = ready.pop_first() {
        order.push(index);
        let Some(node) = graph.node(index) else {
            continue;
        };
        for dependent in node.dependents() {
            if let Some(degree) = in_degree.get_mut(&dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() == graph.node_count() {
        return Ok(order);
    }

    let mut stuck: BTreeSet<NodeIndex> = in_degree
        .into_iter()
        .filter(|(_, degree)| *degree > 0)
        .map(|(index, _)| index)
        .collect();
    // Peel off nodes that merely sit downstream of a cycle.
    loop {
        let downstream: Vec<NodeIndex> = stuck
            .iter()
            .copied()
            .filter(|index| {
                graph
                    .node(*index)
                    .map_or(true, |node| node.dependents().all(|d| !stuck.contains(&d)))
            })
            .collect();
        if downstream.is_empty() {
            break;
        }
        for index in downstream {
            stuck.remove(&index);
        }
    }

    let mut names: Vec<String> = stuck
        .into_iter()
        .filter_map(|index| graph.node(index))
        .map(|node| node.module.name().to_string())
        .collect();
    names.sort();
    Err(CycleError(names))
}
