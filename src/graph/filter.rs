use std::collections::BTreeSet;

use log::debug;

use super::{DependencyGraph, NodeIndex};

/// Removes the modules that cannot be set up with what is installed.
///
/// A module that is not installed is dropped unless it is isolated (no edges at
/// all). Any module with a hard dependency on a dropped module is dropped too,
/// whether installed or not. Optional edges never cause a drop; they simply
/// vanish with their source.
pub fn filter_graph(graph: &DependencyGraph) -> DependencyGraph {
    let mut dropped: BTreeSet<NodeIndex> = graph
        .nodes()
        .filter(|(_, node)| !node.installed && !node.is_isolated())
        .map(|(index, _)| index)
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for (index, node) in graph.nodes() {
            if dropped.contains(&index) {
                continue;
            }
            let missing = node
                .dependencies()
                .find(|(dependency, edge)| !edge.optional && dropped.contains(dependency));
            if let Some((dependency, _)) = missing {
                debug!(
                    "Dropping {}: required {} is unavailable",
                    node.module.name(),
                    graph
                        .node(dependency)
                        .map(|n| n.module.name().to_string())
                        .unwrap_or_default()
                );
                dropped.insert(index);
                changed = true;
            }
        }
    }

    let dropped_names: Vec<String> = dropped
        .iter()
        .filter_map(|index| graph.node(*index))
        .map(|node| node.module.name().to_string())
        .collect();
    debug!("Removing nodes {:?}", dropped_names);

    let retained = graph
        .nodes()
        .map(|(index, _)| index)
        .filter(|index| !dropped.contains(index))
        .collect();
    graph.subgraph(&retained)
}
