use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::{
    graph::{build_dependency_graph, filter_graph, topological_order, CycleError, GraphError},
    model::Module,
    oracle::PackageOracle,
    registry::ModuleRegistry,
};

/// Module that provides the tools every other module relies on. It always runs
/// first and is not part of the dependency graph ordering.
pub const BASE_MODULE: &str = "utils";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Target '{0}' not found!")]
    TargetNotFound(String),
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Modules to run, dependencies first.
///
/// With `filter_missing` the modules that cannot run with the installed
/// packages are left out. With a `target` only that module and what it
/// transitively depends on are returned. The [`BASE_MODULE`], when known,
/// always comes first.
pub fn get_execution_order(
    registry: &ModuleRegistry,
    oracle: &dyn PackageOracle,
    target: Option<&str>,
    filter_missing: bool,
) -> Result<Vec<Arc<Module>>, ResolveError> {
    let base = registry.find(BASE_MODULE);
    if let Some(base) = base.filter(|_| target == Some(BASE_MODULE)) {
        return Ok(vec![Arc::clone(base)]);
    }

    debug!("Building dependency graph...");
    let mut graph = build_dependency_graph(registry.discover_modules(), oracle)?;
    if filter_missing {
        graph = filter_graph(&graph);
    }

    let order = topological_order(&graph)?;

    let order = match target {
        None => order,
        Some(target) => {
            let index = graph
                .index_of(target)
                .ok_or_else(|| ResolveError::TargetNotFound(target.to_string()))?;
            let mut keep = graph.ancestors(index);
            keep.insert(index);
            topological_order(&graph.subgraph(&keep))?
        }
    };

    let mut modules: Vec<Arc<Module>> = base.into_iter().cloned().collect();
    modules.extend(
        order
            .into_iter()
            .filter_map(|index| graph.node(index))
            .map(|node| Arc::clone(&node.module))
            .filter(|module| module.name().as_str() != BASE_MODULE),
    );
    debug!(
        "Execution order: {:?}",
        modules.iter().map(|m| m.name().as_str()).collect::<Vec<_>>()
    );
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::ModuleDefinition,
        oracle::{AssumeInstalled, InstalledSet},
    };

    use pretty_assertions::assert_eq;

    fn names(modules: &[Arc<Module>]) -> Vec<String> {
        modules.iter().map(|m| m.name().to_string()).collect()
    }

    fn registry() -> ModuleRegistry {
        ModuleRegistry::from_definitions(vec![
            ModuleDefinition::new("glance")
                .depends(&["keystone", "mysql"])
                .packages(&["glance-api"]),
            ModuleDefinition::new("keystone")
                .depends(&["mysql"])
                .packages(&["keystone"]),
            ModuleDefinition::new("mysql").packages(&["mysql-server"]),
            ModuleDefinition::new("rabbitmq").packages(&["rabbitmq-server"]),
            ModuleDefinition::new("utils").packages(&["crudini"]),
        ])
        .unwrap()
    }

    #[test]
    fn full_order() {
        let order = get_execution_order(&registry(), &AssumeInstalled, None, true).unwrap();
        assert_eq!(
            names(&order),
            vec!["utils", "mysql", "keystone", "glance", "rabbitmq"]
        );
    }

    #[test]
    fn target_isolation() {
        let order =
            get_execution_order(&registry(), &AssumeInstalled, Some("keystone"), true).unwrap();
        assert_eq!(names(&order), vec!["utils", "mysql", "keystone"]);
    }

    #[test]
    fn target_without_dependencies() {
        let order =
            get_execution_order(&registry(), &AssumeInstalled, Some("utils"), false).unwrap();
        assert_eq!(names(&order), vec!["utils"]);
    }

    #[test]
    fn unknown_target() {
        let err =
            get_execution_order(&registry(), &AssumeInstalled, Some("invalid"), false).unwrap_err();
        assert_eq!(err.to_string(), "Target 'invalid' not found!");
    }

    #[test]
    fn target_filtered_out() {
        let oracle = InstalledSet::new(["glance-api", "keystone", "rabbitmq-server"]);

        let err = get_execution_order(&registry(), &oracle, Some("glance"), true).unwrap_err();
        assert!(matches!(err, ResolveError::TargetNotFound(name) if name == "glance"));

        let order = get_execution_order(&registry(), &oracle, Some("glance"), false).unwrap();
        assert_eq!(names(&order), vec!["utils", "mysql", "keystone", "glance"]);
    }

    #[test]
    fn filtered_order_keeps_isolated_modules() {
        let oracle = InstalledSet::new(["rabbitmq-server"]);
        let order = get_execution_order(&registry(), &oracle, None, true).unwrap();
        assert_eq!(names(&order), vec!["utils", "rabbitmq"]);
    }

    #[test]
    fn base_module_runs_first_even_when_depended_on() {
        let registry = ModuleRegistry::from_definitions(vec![
            ModuleDefinition::new("keystone")
                .depends(&["mysql", "utils"])
                .packages(&["keystone"]),
            ModuleDefinition::new("mysql").packages(&["mysql-server"]),
            ModuleDefinition::new("utils").packages(&["crudini"]),
        ])
        .unwrap();

        let order = get_execution_order(&registry, &AssumeInstalled, None, true).unwrap();
        assert_eq!(names(&order), vec!["utils", "mysql", "keystone"]);

        let oracle = InstalledSet::new(["keystone", "mysql-server"]);
        let order = get_execution_order(&registry, &oracle, Some("utils"), true).unwrap();
        assert_eq!(names(&order), vec!["utils"]);
    }

    #[test]
    fn order_without_base_module() {
        let registry = ModuleRegistry::from_definitions(vec![
            ModuleDefinition::new("keystone").depends(&["mysql"]),
            ModuleDefinition::new("mysql"),
        ])
        .unwrap();
        let order = get_execution_order(&registry, &AssumeInstalled, None, true).unwrap();
        assert_eq!(names(&order), vec!["mysql", "keystone"]);
    }

    #[test]
    fn cycle_is_reported() {
        let registry = ModuleRegistry::from_definitions(vec![
            ModuleDefinition::new("a").depends(&["b"]),
            ModuleDefinition::new("b").optional(&["a"]),
            ModuleDefinition::new("c"),
        ])
        .unwrap();

        let err = get_execution_order(&registry, &AssumeInstalled, Some("c"), true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Circular dependency detected between modules: a, b"
        );
    }

    #[test]
    fn order_is_deterministic() {
        let registry = registry();
        let first = get_execution_order(&registry, &AssumeInstalled, None, true).unwrap();
        let second = get_execution_order(&registry, &AssumeInstalled, None, true).unwrap();
        assert_eq!(first, second);
    }
}
