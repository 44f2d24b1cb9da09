use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One reference identity in the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryEntry {
    /// Normalized identifier derived from the reference file name.
    pub identifier: String,
    pub reference_image: PathBuf,
}

/// Biographical/case record for a known person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    pub age: u32,
    pub gender: String,
    /// Offense list, in recorded order.
    pub crimes: Vec<String>,
    pub status: String,
    pub last_known_address: String,
    pub release_date: Option<NaiveDate>,
}

/// Why an identification produced no decision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutcomeError {
    #[error("query image unreadable: {path}: {detail}")]
    InputUnreadable { path: PathBuf, detail: String },
    #[error("identification cancelled")]
    Cancelled,
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Final decision for one query image.
///
/// `confidence` is always on the 0–100 scale, higher = more similar.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentificationOutcome {
    NoMatch,
    Match { identifier: String, confidence: f32 },
    Error { reason: OutcomeError },
}

impl IdentificationOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }
}

/// Normalize a lookup key: lowercase, whitespace runs collapsed to one space.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
