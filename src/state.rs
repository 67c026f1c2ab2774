//! Progress of the setup stage, persisted across runs.
//!
//! Each module that finished its setup leaves an empty `<name>.done` marker in
//! the state directory.

use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use crate::{flock::FileLock, model::ModuleName};

pub const DEFAULT_STATE_DIRECTORY: &str = "/var/lib/regress-stack";

const LOCK_FILE_NAME: &str = ".lock";
const MARKER_EXTENSION: &str = "done";

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Could not create state directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not record setup of {module}: {source}")]
    Mark {
        module: ModuleName,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not lock state directory: {0}")]
    Lock(#[from] crate::flock::Error),
}

#[derive(Debug, Clone)]
pub struct SetupState {
    directory: PathBuf,
}

impl SetupState {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        SetupState {
            directory: directory.into(),
        }
    }

    pub fn mark_setup(&self, module: &ModuleName) -> Result<(), StateError> {
        self.ensure_directory()?;
        let marker = self.marker(module);
        debug!("Marking {} as set up ({})", module, marker.display());
        std::fs::write(&marker, b"").map_err(|source| StateError::Mark {
            module: module.clone(),
            source,
        })
    }

    pub fn is_setup_done(&self, module: &ModuleName) -> bool {
        self.marker(module).is_file()
    }

    /// Exclusive lock over the state directory, held for a whole stage.
    pub fn lock(&self) -> Result<FileLock, StateError> {
        self.ensure_directory()?;
        Ok(FileLock::new(&self.directory.join(LOCK_FILE_NAME))?)
    }

    fn marker(&self, module: &ModuleName) -> PathBuf {
        self.directory
            .join(module.as_str())
            .with_extension(MARKER_EXTENSION)
    }

    fn ensure_directory(&self) -> Result<(), StateError> {
        std::fs::create_dir_all(&self.directory).map_err(|source| StateError::CreateDirectory {
            path: self.directory.clone(),
            source,
        })
    }
}

impl Default for SetupState {
    fn default() -> Self {
        SetupState::new(DEFAULT_STATE_DIRECTORY)
    }
}
