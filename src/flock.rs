use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::{debug, warn};
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Exclusive advisory lock, released when dropped.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("Timed out waiting for the lock on {0}")]
    Timeout(PathBuf),
}

impl FileLock {
    pub fn new(path: &Path) -> Result<Self, Error> {
        Self::with_timeout(path, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(path: &Path, timeout: Duration) -> Result<Self, Error> {
        let file = File::create(path)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(_) => {
                    debug!("Acquired lock on {}", path.display());
                    return Ok(Self {
                        _file: file,
                        path: path.to_path_buf(),
                    });
                }
                Err(error)
                    if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() =>
                {
                    if start.elapsed() >= timeout {
                        return Err(Error::Timeout(path.to_path_buf()));
                    }
                    warn!("{} is locked by another process, retrying", path.display());
                    std::thread::sleep(Duration::from_secs(1).min(timeout));
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        let lock = FileLock::new(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
        drop(lock);

        FileLock::with_timeout(&path, Duration::ZERO).unwrap();
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = FileLock::new(Path::new("/nonexistent/dir/.lock")).unwrap_err();
        assert!(matches!(err, Error::IO(_)));
    }
}
