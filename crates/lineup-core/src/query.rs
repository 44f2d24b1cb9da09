//! Request-scoped query image storage.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryImageError {
    #[error("no image uploaded")]
    Empty,
    #[error("failed to store query image in {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Uniquely named temporary file holding one request's query image.
///
/// The file is removed when the guard drops, whichever way the owning
/// request ends.
#[derive(Debug)]
pub struct QueryImage {
    path: PathBuf,
}

impl QueryImage {
    /// Write `bytes` to `<dir>/<uuid>.upload`, creating `dir` if needed.
    pub fn store(dir: &Path, bytes: &[u8]) -> Result<Self, QueryImageError> {
        Self::store_with(dir, bytes, |path, bytes| std::fs::write(path, bytes))
    }

    fn store_with(
        dir: &Path,
        bytes: &[u8],
        write: impl FnOnce(&Path, &[u8]) -> std::io::Result<()>,
    ) -> Result<Self, QueryImageError> {
        if bytes.is_empty() {
            return Err(QueryImageError::Empty);
        }
        let io_err = |source| QueryImageError::Io {
            dir: dir.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;

        // guard first, so a partial write is removed too
        let query = Self {
            path: dir.join(format!("{}.upload", uuid::Uuid::new_v4())),
        };
        write(&query.path, bytes).map_err(io_err)?;
        tracing::debug!(path = %query.path.display(), bytes = bytes.len(), "query image stored");
        Ok(query)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for QueryImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "query image removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove query image")
            }
        }
    }
}
