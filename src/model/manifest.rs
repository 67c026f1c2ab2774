//! Declarative module manifest.
//!
//! Every top level table is one module:
//!
//! ```toml
//! [octavia]
//! depends = ["keystone", "mysql", "rabbitmq"]
//! optional_depends = ["barbican"]
//! packages = ["octavia-api"]
//! tempest_packages = ["python3-octavia-tempest-plugin"]
//! logs = ["/var/log/octavia/"]
//! test_include = ["octavia_tempest_plugin.tests.api"]
//! test_exclude = []
//! setup = [["systemctl", "restart", "octavia-api"]]
//! tempest_config = [["service_available", "load_balancer", "true"]]
//! ```

use std::path::Path;

use log::{debug, error};
use toml::{Table, Value};

use super::{
    capability::ConfigSetting,
    module::{ModuleDefinition, ModuleName, Origin},
    ParseError,
};

const KEYS: &[&str] = &[
    "depends",
    "optional_depends",
    "packages",
    "tempest_packages",
    "logs",
    "test_include",
    "test_exclude",
    "setup",
    "tempest_config",
];

pub struct Manifest;

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Vec<ModuleDefinition>, ParseError> {
        debug!("Attempting to read module manifest {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let definitions =
            Manifest::from_toml_str(&contents, &Origin::Manifest(path.to_path_buf()));
        if let Err(err) = &definitions {
            error!(
                "Could not load modules from manifest {} due to err {err}",
                path.display()
            )
        }
        definitions
    }

    pub fn from_toml_str(data: &str, origin: &Origin) -> Result<Vec<ModuleDefinition>, ParseError> {
        toml::from_str::<Table>(data)?
            .into_iter()
            .map(|(name, value)| parse_module(name, &value, origin))
            .collect()
    }
}

fn parse_module(name: String, value: &Value, origin: &Origin) -> Result<ModuleDefinition, ParseError> {
    let table = value
        .as_table()
        .ok_or_else(|| ParseError::NotATable(name.clone()))?;

    if let Some(key) = table.keys().find(|k| !KEYS.contains(&k.as_str())) {
        return Err(ParseError::UnknownKey {
            module: name,
            key: key.clone(),
        });
    }

    let mut definition = ModuleDefinition::new(ModuleName::new(name.clone()));
    definition.origin = origin.clone();
    definition.dependencies = string_list(table, "depends")?
        .into_iter()
        .map(ModuleName::new)
        .collect();
    definition.optional_dependencies = string_list(table, "optional_depends")?
        .into_iter()
        .map(ModuleName::new)
        .collect();
    definition.packages.packages = string_list(table, "packages")?;
    definition.packages.tempest_packages = string_list(table, "tempest_packages")?;
    definition.logs = string_list(table, "logs")?
        .into_iter()
        .map(Into::into)
        .collect();
    definition.test_filters.include = string_list(table, "test_include")?;
    definition.test_filters.exclude = string_list(table, "test_exclude")?;

    definition.setup = nested_string_list(table, "setup")?;
    if definition.setup.iter().any(Vec::is_empty) {
        return Err(ParseError::EmptyCommand(name));
    }

    definition.tempest_config = nested_string_list(table, "tempest_config")?
        .into_iter()
        .map(|setting| match setting.as_slice() {
            [section, key, value] => Ok(ConfigSetting::new(section, key, value)),
            _ => Err(ParseError::InvalidSetting {
                module: name.clone(),
                len: setting.len(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(definition)
}

fn string_list(table: &Table, key: &str) -> Result<Vec<String>, ParseError> {
    Ok(table
        .get(key)
        .map(|v| v.clone().try_into::<Vec<String>>())
        .map_or(Ok(None), |v| v.map(Some))?
        .unwrap_or_default())
}

fn nested_string_list(table: &Table, key: &str) -> Result<Vec<Vec<String>>, ParseError> {
    Ok(table
        .get(key)
        .map(|v| v.clone().try_into::<Vec<Vec<String>>>())
        .map_or(Ok(None), |v| v.map(Some))?
        .unwrap_or_default())
}
