use std::{collections::HashSet, sync::Arc};

use crate::model::{Module, PackageFlags};

/// Packages needed by `order`, without duplicates, in the order they are first named.
pub fn collect_packages(order: &[Arc<Module>], flags: PackageFlags) -> Vec<String> {
    let mut seen = HashSet::new();
    order
        .iter()
        .flat_map(|module| module.packages(flags))
        .filter(|package| seen.insert(package.clone()))
        .collect()
}

/// Single line, space separated, ready to be passed to a package manager.
pub fn format_packages(packages: &[String]) -> String {
    packages.join(" ")
}
