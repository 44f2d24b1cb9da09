//! Gallery provider: enumerates reference images on disk.

use crate::types::{normalize_key, GalleryEntry};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions accepted as reference images (compared case-insensitively).
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read gallery {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of gallery entries. Order must be deterministic within a process run.
pub trait GalleryProvider: Send + Sync {
    fn list_entries(&self) -> Result<Vec<GalleryEntry>, GalleryError>;
}

/// Gallery backed by a flat directory of images, one person per file.
///
/// `sachin_kumar.jpg` yields identifier `sachin kumar`. Entries are sorted
/// by file name.
#[derive(Debug, Clone)]
pub struct DirectoryGallery {
    root: PathBuf,
}

impl DirectoryGallery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl GalleryProvider for DirectoryGallery {
    fn list_entries(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        if !self.root.is_dir() {
            return Err(GalleryError::NotFound(self.root.clone()));
        }
        let io_err = |source| GalleryError::Io {
            path: self.root.clone(),
            source,
        };

        let mut files = Vec::new();
        for dirent in std::fs::read_dir(&self.root).map_err(io_err)? {
            let dirent = dirent.map_err(io_err)?;
            let path = dirent.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(files.len());
        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = %path.display(), "skipping non-UTF-8 file name");
                continue;
            };
            let identifier = identifier_from_file_name(name);
            if identifier.is_empty() {
                tracing::debug!(file = name, "skipping file with empty identifier");
                continue;
            }
            if !seen.insert(identifier.clone()) {
                tracing::warn!(identifier = %identifier, file = name, "duplicate gallery identifier");
            }
            entries.push(GalleryEntry {
                identifier,
                reference_image: path,
            });
        }

        tracing::debug!(root = %self.root.display(), count = entries.len(), "gallery listed");
        Ok(entries)
    }
}

/// Derive an identifier from a file name: text before the first `.`,
/// underscores as spaces, lowercased with whitespace collapsed.
pub fn identifier_from_file_name(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or_default();
    normalize_key(&stem.replace('_', " "))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}
