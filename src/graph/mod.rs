//! Directed dependency graph over modules.
//!
//! Edges point from a dependency to its dependent, so a topological order lists
//! dependencies first. Nodes are keyed by their discovery index, which stays the
//! same in every subgraph derived from a graph.

mod filter;
mod order;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    model::{Module, PackageFlags},
    oracle::PackageOracle,
};

pub use filter::filter_graph;
pub use order::{topological_order, CycleError};

pub type NodeIndex = usize;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Module `{module}` depends on `{dependency}` which is not part of the graph")]
    UnknownDependency { module: String, dependency: String },
    #[error("Could not determine whether `{module}` is installed: {source}")]
    Oracle {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub module: Arc<Module>,
    pub installed: bool,
    dependencies: BTreeMap<NodeIndex, Edge>,
    dependents: BTreeSet<NodeIndex>,
}

impl Node {
    /// Incoming edges: the nodes this one depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = (NodeIndex, Edge)> + '_ {
        self.dependencies.iter().map(|(index, edge)| (*index, *edge))
    }

    /// Outgoing edges: the nodes depending on this one.
    pub fn dependents(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.dependents.iter().copied()
    }

    fn is_isolated(&self) -> bool {
        self.dependencies.is_empty() && self.dependents.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<NodeIndex, Node>,
    next_index: NodeIndex,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, module: Arc<Module>, installed: bool) -> NodeIndex {
        let index = self.next_index;
        self.next_index += 1;
        self.nodes.insert(
            index,
            Node {
                module,
                installed,
                dependencies: BTreeMap::new(),
                dependents: BTreeSet::new(),
            },
        );
        index
    }

    /// Adds `from -> to`. An existing hard edge between the same pair is never
    /// downgraded to optional; an optional one is upgraded by a hard edge.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, optional: bool) {
        if !self.nodes.contains_key(&from) {
            return;
        }
        let Some(dependent) = self.nodes.get_mut(&to) else {
            return;
        };
        dependent
            .dependencies
            .entry(from)
            .and_modify(|edge| edge.optional &= optional)
            .or_insert(Edge { optional });
        if let Some(dependency) = self.nodes.get_mut(&from) {
            dependency.dependents.insert(to);
        }
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(&index)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> + '_ {
        self.nodes.iter().map(|(index, node)| (*index, node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, Edge)> + '_ {
        self.nodes.iter().flat_map(|(to, node)| {
            node.dependencies
                .iter()
                .map(move |(from, edge)| (*from, *to, *edge))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.dependencies.len()).sum()
    }

    pub fn edge(&self, from: NodeIndex, to: NodeIndex) -> Option<Edge> {
        self.nodes
            .get(&to)
            .and_then(|node| node.dependencies.get(&from))
            .copied()
    }

    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .find(|(_, node)| node.module.name().as_str() == name)
            .map(|(index, _)| *index)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.nodes
            .values()
            .map(|node| node.module.name().to_string())
            .collect()
    }

    /// The graph induced by `keep`: retained nodes with their attributes and
    /// every edge whose endpoints are both retained.
    pub fn subgraph(&self, keep: &BTreeSet<NodeIndex>) -> DependencyGraph {
        let nodes = self
            .nodes
            .iter()
            .filter(|(index, _)| keep.contains(index))
            .map(|(index, node)| {
                let node = Node {
                    module: Arc::clone(&node.module),
                    installed: node.installed,
                    dependencies: node
                        .dependencies
                        .iter()
                        .filter(|(from, _)| keep.contains(from))
                        .map(|(from, edge)| (*from, *edge))
                        .collect(),
                    dependents: node
                        .dependents
                        .iter()
                        .filter(|to| keep.contains(to))
                        .copied()
                        .collect(),
                };
                (*index, node)
            })
            .collect();
        DependencyGraph {
            nodes,
            next_index: self.next_index,
        }
    }

    /// Every node `index` transitively depends on, optional edges included.
    pub fn ancestors(&self, index: NodeIndex) -> BTreeSet<NodeIndex> {
        let mut ancestors = BTreeSet::new();
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for dependency in node.dependencies.keys() {
                    if ancestors.insert(*dependency) {
                        stack.push(*dependency);
                    }
                }
            }
        }
        ancestors.remove(&index);
        ancestors
    }
}

/// Builds the graph for `modules`, asking `oracle` once per module whether
/// its packages are installed.
pub fn build_dependency_graph(
    modules: &[Arc<Module>],
    oracle: &dyn PackageOracle,
) -> Result<DependencyGraph, GraphError> {
    let mut graph = DependencyGraph::new();
    let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

    for module in modules {
        let packages = module.packages(PackageFlags { skip_tempest: true });
        let installed = oracle
            .are_installed(&packages)
            .map_err(|source| GraphError::Oracle {
                module: module.name().to_string(),
                source,
            })?;
        trace!("Module {} installed: {}", module.name(), installed);
        let index = graph.add_node(Arc::clone(module), installed);
        indices.insert(module.name().as_str(), index);
    }

    let lookup = |module: &Module, dependency: &str| {
        indices
            .get(dependency)
            .copied()
            .ok_or_else(|| GraphError::UnknownDependency {
                module: module.name().to_string(),
                dependency: dependency.to_string(),
            })
    };

    for module in modules {
        let to = lookup(module, module.name().as_str())?;
        for dependency in module.hard_dependencies() {
            graph.add_edge(lookup(module, dependency.as_str())?, to, false);
        }
    }
    for module in modules {
        let to = lookup(module, module.name().as_str())?;
        for dependency in module.optional_dependencies() {
            let from = lookup(module, dependency.as_str())?;
            if graph.edge(from, to).is_none() {
                graph.add_edge(from, to, true);
            }
        }
    }

    debug!(
        "Built dependency graph with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{model::ModuleDefinition, oracle::InstalledSet};

    use pretty_assertions::assert_eq;

    fn modules() -> Vec<Arc<Module>> {
        [
            ModuleDefinition::new("mod1").packages(&["pkg1"]),
            ModuleDefinition::new("mod2")
                .depends(&["mod1"])
                .packages(&["pkg2"]),
            ModuleDefinition::new("mod3")
                .optional(&["mod1"])
                .packages(&["pkg3"]),
        ]
        .into_iter()
        .map(|d| Arc::new(Module::from_definition(d)))
        .collect()
    }

    struct CountingOracle {
        calls: std::cell::RefCell<Vec<Vec<String>>>,
        missing: &'static str,
    }

    impl PackageOracle for CountingOracle {
        fn are_installed(&self, packages: &[String]) -> anyhow::Result<bool> {
            self.calls.borrow_mut().push(packages.to_vec());
            Ok(!packages.iter().any(|p| p == self.missing))
        }
    }

    #[test]
    fn build_dependency_graph_edges() {
        let oracle = InstalledSet::new(["pkg1", "pkg2", "pkg3"]);
        let graph = build_dependency_graph(&modules(), &oracle).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);

        let mod1 = graph.index_of("mod1").unwrap();
        let mod2 = graph.index_of("mod2").unwrap();
        let mod3 = graph.index_of("mod3").unwrap();

        assert!(graph.nodes().all(|(_, node)| node.installed));
        assert_eq!(graph.edge(mod1, mod2), Some(Edge { optional: false }));
        assert_eq!(graph.edge(mod1, mod3), Some(Edge { optional: true }));
        assert_eq!(graph.edge(mod2, mod3), None);
    }

    #[test]
    fn build_dependency_graph_missing_packages() {
        let oracle = CountingOracle {
            calls: Default::default(),
            missing: "pkg1",
        };
        let graph = build_dependency_graph(&modules(), &oracle).unwrap();

        let installed: HashMap<String, bool> = graph
            .nodes()
            .map(|(_, node)| (node.module.name().to_string(), node.installed))
            .collect();
        assert_eq!(
            installed,
            HashMap::from([
                ("mod1".to_string(), false),
                ("mod2".to_string(), true),
                ("mod3".to_string(), true),
            ])
        );
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(
            oracle.calls.into_inner(),
            vec![vec!["pkg1"], vec!["pkg2"], vec!["pkg3"]]
        );
    }

    #[test]
    fn hard_dependency_takes_precedence() {
        let modules: Vec<Arc<Module>> = [
            ModuleDefinition::new("a"),
            ModuleDefinition::new("b").depends(&["a"]).optional(&["a"]),
        ]
        .into_iter()
        .map(|d| Arc::new(Module::from_definition(d)))
        .collect();

        let graph = build_dependency_graph(&modules, &InstalledSet::default()).unwrap();

        assert_eq!(graph.edge_count(), 1);
        let (from, to, edge) = graph.edges().next().unwrap();
        assert_eq!((from, to), (0, 1));
        assert!(!edge.optional);
    }

    #[test]
    fn add_edge_never_downgrades() {
        let mut graph = testing::graph(&[("a", true), ("b", true)], &[("a", "b", false)]);
        graph.add_edge(0, 1, true);
        assert_eq!(graph.edge(0, 1), Some(Edge { optional: false }));

        let mut graph = testing::graph(&[("a", true), ("b", true)], &[("a", "b", true)]);
        graph.add_edge(0, 1, false);
        assert_eq!(graph.edge(0, 1), Some(Edge { optional: false }));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn empty_package_list_is_installed() {
        let modules = vec![testing::module("utils")];
        let graph = build_dependency_graph(&modules, &InstalledSet::default()).unwrap();
        assert!(graph.node(0).unwrap().installed);
    }

    #[test]
    fn oracle_failure_propagates() {
        struct Broken;
        impl PackageOracle for Broken {
            fn are_installed(&self, _packages: &[String]) -> anyhow::Result<bool> {
                anyhow::bail!("database locked")
            }
        }

        let err = build_dependency_graph(&modules(), &Broken).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not determine whether `mod1` is installed: database locked"
        );
    }

    #[test]
    fn dependency_outside_the_module_set() {
        let modules = vec![Arc::new(Module::from_definition(
            ModuleDefinition::new("glance").depends(&["keystone"]),
        ))];
        let err = build_dependency_graph(&modules, &InstalledSet::default()).unwrap_err();
        assert!(matches!(err, GraphError::UnknownDependency { .. }));
    }

    #[test]
    fn ancestors_are_transitive() {
        let graph = testing::graph(
            &[
                ("mysql", true),
                ("keystone", true),
                ("glance", true),
                ("rabbitmq", true),
            ],
            &[
                ("mysql", "keystone", false),
                ("keystone", "glance", true),
            ],
        );
        let glance = graph.index_of("glance").unwrap();
        let names: Vec<String> = graph
            .ancestors(glance)
            .into_iter()
            .map(|i| graph.node(i).unwrap().module.name().to_string())
            .collect();
        assert_eq!(names, vec!["mysql", "keystone"]);
    }

    #[test]
    fn subgraph_keeps_attributes() {
        let graph = testing::graph(
            &[("mysql", true), ("keystone", false), ("glance", true)],
            &[
                ("mysql", "keystone", false),
                ("mysql", "glance", false),
                ("keystone", "glance", true),
            ],
        );
        let sub = graph.subgraph(&BTreeSet::from([0, 1]));

        assert_eq!(sub.node_count(), 2);
        assert_eq!(sub.edge_count(), 1);
        assert!(!sub.node(1).unwrap().installed);
        assert_eq!(sub.node(0).unwrap().dependents().collect::<Vec<_>>(), vec![1]);
        assert_eq!(graph.node_count(), 3);
    }
}
