use std::{
    collections::BTreeSet,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::capability::{CommandSetup, ConfigSetting, ConfigureTempest, CrudiniTempestConfig, Setup};

#[derive(Clone, Hash, Deserialize, Serialize, Debug, Default, PartialEq, Eq, Ord, PartialOrd)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(s: String) -> Self {
        ModuleName(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ModuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ModuleName {
    fn from(s: String) -> Self {
        ModuleName(s)
    }
}

impl From<&str> for ModuleName {
    fn from(s: &str) -> Self {
        ModuleName(s.to_string())
    }
}

/// Where a module definition was loaded from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Origin {
    /// Compiled into the binary.
    #[default]
    Builtin,
    /// Declared in a TOML module manifest.
    Manifest(PathBuf),
}

impl Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Builtin => f.write_str("builtin"),
            Origin::Manifest(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Identity of a loaded module.
///
/// Two modules are the same module only if both the name and the origin match,
/// so a manifest module never gets conflated with a builtin that happens to
/// declare the same attributes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ModuleId {
    pub name: ModuleName,
    pub origin: Origin,
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.origin)
    }
}

/// Flags that influence which packages a module asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageFlags {
    /// Leave out the packages only needed to run the regression tests.
    pub skip_tempest: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSpec {
    pub packages: Vec<String>,
    pub tempest_packages: Vec<String>,
}

impl PackageSpec {
    pub fn determine(&self, flags: PackageFlags) -> Vec<String> {
        let mut packages = self.packages.clone();
        if !flags.skip_tempest {
            packages.extend(self.tempest_packages.iter().cloned());
        }
        packages
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestFilters {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Raw, unvalidated description of a module as written in the catalog or in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDefinition {
    pub name: ModuleName,
    pub origin: Origin,
    pub dependencies: BTreeSet<ModuleName>,
    pub optional_dependencies: BTreeSet<ModuleName>,
    pub packages: PackageSpec,
    pub logs: Vec<PathBuf>,
    pub test_filters: TestFilters,
    pub setup: Vec<Vec<String>>,
    pub tempest_config: Vec<ConfigSetting>,
}

impl ModuleDefinition {
    pub fn new(name: impl Into<ModuleName>) -> Self {
        ModuleDefinition {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn depends(mut self, names: &[&str]) -> Self {
        self.dependencies.extend(names.iter().map(|n| ModuleName::from(*n)));
        self
    }

    pub fn optional(mut self, names: &[&str]) -> Self {
        self.optional_dependencies
            .extend(names.iter().map(|n| ModuleName::from(*n)));
        self
    }

    pub fn packages(mut self, packages: &[&str]) -> Self {
        self.packages.packages = to_strings(packages);
        self
    }

    pub fn tempest_packages(mut self, packages: &[&str]) -> Self {
        self.packages.tempest_packages = to_strings(packages);
        self
    }

    pub fn logs(mut self, paths: &[&str]) -> Self {
        self.logs = paths.iter().map(PathBuf::from).collect();
        self
    }

    pub fn test_include(mut self, regexes: &[&str]) -> Self {
        self.test_filters.include = to_strings(regexes);
        self
    }

    pub fn test_exclude(mut self, regexes: &[&str]) -> Self {
        self.test_filters.exclude = to_strings(regexes);
        self
    }

    pub fn tempest_setting(mut self, section: &str, key: &str, value: &str) -> Self {
        self.tempest_config
            .push(ConfigSetting::new(section, key, value));
        self
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// A loaded, immutable unit of service setup logic.
pub struct Module {
    id: ModuleId,
    dependencies: BTreeSet<ModuleName>,
    optional_dependencies: BTreeSet<ModuleName>,
    packages: PackageSpec,
    logs: Vec<PathBuf>,
    test_filters: TestFilters,
    setup: Option<Box<dyn Setup>>,
    tempest: Option<Box<dyn ConfigureTempest>>,
}

impl Module {
    pub fn from_definition(definition: ModuleDefinition) -> Self {
        let ModuleDefinition {
            name,
            origin,
            dependencies,
            optional_dependencies,
            packages,
            logs,
            test_filters,
            setup,
            tempest_config,
        } = definition;

        let setup: Option<Box<dyn Setup>> = if setup.is_empty() {
            None
        } else {
            Some(Box::new(CommandSetup::new(setup)))
        };
        let tempest: Option<Box<dyn ConfigureTempest>> = if tempest_config.is_empty() {
            None
        } else {
            Some(Box::new(CrudiniTempestConfig::new(tempest_config)))
        };

        Module {
            id: ModuleId { name, origin },
            dependencies,
            optional_dependencies,
            packages,
            logs,
            test_filters,
            setup,
            tempest,
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn name(&self) -> &ModuleName {
        &self.id.name
    }

    pub fn hard_dependencies(&self) -> &BTreeSet<ModuleName> {
        &self.dependencies
    }

    pub fn optional_dependencies(&self) -> &BTreeSet<ModuleName> {
        &self.optional_dependencies
    }

    /// Packages required for this module given the `flags`.
    pub fn packages(&self, flags: PackageFlags) -> Vec<String> {
        self.packages.determine(flags)
    }

    pub fn logs(&self) -> impl Iterator<Item = &Path> {
        self.logs.iter().map(PathBuf::as_path)
    }

    pub fn test_filters(&self) -> &TestFilters {
        &self.test_filters
    }

    pub fn setup_hook(&self) -> Option<&dyn Setup> {
        self.setup.as_deref()
    }

    pub fn tempest_hook(&self) -> Option<&dyn ConfigureTempest> {
        self.tempest.as_deref()
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Module {}

impl Hash for Module {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.id.name, f)
    }
}

impl Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("optional_dependencies", &self.optional_dependencies)
            .field("packages", &self.packages)
            .finish_non_exhaustive()
    }
}
