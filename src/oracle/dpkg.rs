use std::{
    cell::OnceCell,
    collections::HashSet,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use thiserror::Error;

use super::PackageOracle;

pub const DEFAULT_STATUS_PATH: &str = "/var/lib/dpkg/status";

#[derive(Error, Debug)]
pub enum DpkgError {
    #[error("Could not read dpkg status database {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reads installed state from the dpkg status database.
///
/// The database is parsed on first use and kept for the lifetime of the oracle.
pub struct DpkgStatusOracle {
    path: PathBuf,
    installed: OnceCell<HashSet<String>>,
}

impl DpkgStatusOracle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DpkgStatusOracle {
            path: path.into(),
            installed: OnceCell::new(),
        }
    }

    fn installed(&self) -> Result<&HashSet<String>, DpkgError> {
        if let Some(installed) = self.installed.get() {
            return Ok(installed);
        }
        let installed = load_status(&self.path)?;
        Ok(self.installed.get_or_init(|| installed))
    }
}

impl PackageOracle for DpkgStatusOracle {
    fn are_installed(&self, packages: &[String]) -> anyhow::Result<bool> {
        if packages.is_empty() {
            return Ok(true);
        }
        let installed = self.installed()?;
        Ok(packages.iter().all(|package| {
            let name = package.split(':').next().unwrap_or(package);
            installed.contains(name)
        }))
    }
}

fn load_status(path: &Path) -> Result<HashSet<String>, DpkgError> {
    debug!("Reading dpkg status from {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|source| DpkgError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let installed = parse_status(&contents);
    debug!("Found {} installed packages", installed.len());
    Ok(installed)
}

/// Names of the packages whose `Status` field ends in `installed`.
fn parse_status(contents: &str) -> HashSet<String> {
    let mut installed = HashSet::new();
    for stanza in contents.split("\n\n") {
        let mut package = None;
        let mut is_installed = false;
        for line in stanza.lines() {
            if let Some(name) = line.strip_prefix("Package:") {
                package = Some(name.trim());
            } else if let Some(status) = line.strip_prefix("Status:") {
                is_installed = status.split_whitespace().last() == Some("installed");
            }
        }
        if let (Some(package), true) = (package, is_installed) {
            trace!("{} is installed", package);
            installed.insert(package.to_string());
        }
    }
    installed
}
