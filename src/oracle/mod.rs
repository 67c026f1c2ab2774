mod dpkg;

use std::collections::HashSet;

pub use dpkg::{DpkgError, DpkgStatusOracle, DEFAULT_STATUS_PATH};

/// Answers whether packages are present on the machine.
pub trait PackageOracle {
    /// True when every package in `packages` is installed; true for an empty list.
    fn are_installed(&self, packages: &[String]) -> anyhow::Result<bool>;
}

/// A fixed set of installed packages.
#[derive(Debug, Clone, Default)]
pub struct InstalledSet {
    packages: HashSet<String>,
}

impl InstalledSet {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InstalledSet {
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }
}

impl PackageOracle for InstalledSet {
    fn are_installed(&self, packages: &[String]) -> anyhow::Result<bool> {
        Ok(packages.iter().all(|p| self.packages.contains(p)))
    }
}

/// Treats every package as installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeInstalled;

impl PackageOracle for AssumeInstalled {
    fn are_installed(&self, _packages: &[String]) -> anyhow::Result<bool> {
        Ok(true)
    }
}
