//! lineup-core — Identification engine.
//!
//! Scores one query image against every gallery entry through an opaque
//! [`Comparator`], keeps the best candidate allowed by a [`MatchPolicy`],
//! and resolves the winner against a [`RecordStore`].

pub mod comparator;
pub mod engine;
pub mod gallery;
pub mod policy;
pub mod query;
pub mod resolve;
pub mod response;
pub mod types;

pub use comparator::{Comparator, ComparisonFailure, ComparisonResult, ScoreKind};
pub use engine::{identify, scan, scan_with, CancelToken, Scan, ScanReport, ScanStats};
pub use gallery::{DirectoryGallery, GalleryError, GalleryProvider};
pub use policy::{MatchPolicy, Qualifier};
pub use query::{QueryImage, QueryImageError};
pub use resolve::{resolve, RecordLookupError, RecordStore, Resolution};
pub use response::IdentifyResponse;
pub use types::{normalize_key, GalleryEntry, IdentificationOutcome, OutcomeError, PersonRecord};

use std::path::PathBuf;

/// Per-user data directory: `$XDG_DATA_HOME/lineup`, else `~/.local/share/lineup`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("lineup")
}
