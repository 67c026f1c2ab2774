pub mod catalog;

use std::{collections::BTreeMap, path::Path, sync::Arc};

use log::{debug, info};
use regex_lite::Regex;
use thiserror::Error;

use crate::model::{manifest::Manifest, Module, ModuleDefinition, ModuleName, ParseError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Error while loading module manifest: {0}")]
    Manifest(#[from] ParseError),
    #[error("Invalid module name `{0}`")]
    InvalidName(String),
    #[error("Module `{module}` depends on unknown module `{dependency}`")]
    UnknownDependency { module: String, dependency: String },
}

/// All modules known to this process, loaded once and shared by every resolution.
///
/// Modules are kept in discovery order, which is ascending by name.
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    modules: Vec<Arc<Module>>,
}

impl ModuleRegistry {
    /// The builtin catalog, optionally extended or overridden by a manifest.
    pub fn discover(manifest: Option<&Path>) -> Result<Self, LoadError> {
        let mut definitions = catalog::definitions();
        if let Some(path) = manifest {
            definitions.extend(Manifest::from_file(path)?);
        }
        Self::from_definitions(definitions)
    }

    /// Validates `definitions` and loads one module per name. A later
    /// definition with the same name replaces an earlier one.
    pub fn from_definitions(definitions: Vec<ModuleDefinition>) -> Result<Self, LoadError> {
        let name_pattern = Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid module name regex");

        let mut by_name: BTreeMap<ModuleName, ModuleDefinition> = BTreeMap::new();
        for definition in definitions {
            if !name_pattern.is_match(definition.name.as_str()) {
                return Err(LoadError::InvalidName(definition.name.to_string()));
            }
            if let Some(previous) = by_name.get(&definition.name) {
                info!(
                    "Module {} from {} overrides the one from {}",
                    definition.name, definition.origin, previous.origin
                );
            }
            by_name.insert(definition.name.clone(), definition);
        }

        for definition in by_name.values() {
            let unknown = definition
                .dependencies
                .iter()
                .chain(&definition.optional_dependencies)
                .find(|dependency| !by_name.contains_key(*dependency));
            if let Some(dependency) = unknown {
                return Err(LoadError::UnknownDependency {
                    module: definition.name.to_string(),
                    dependency: dependency.to_string(),
                });
            }
        }

        let modules: Vec<Arc<Module>> = by_name
            .into_values()
            .map(|definition| {
                let module = Module::from_definition(definition);
                debug!("Loaded module {}", module.id());
                Arc::new(module)
            })
            .collect();

        Ok(ModuleRegistry { modules })
    }

    pub fn discover_modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    pub fn list_module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.iter().find(|m| m.name().as_str() == name)
    }
}
