//! Resolution of an identification outcome against the record store.

use crate::types::{normalize_key, IdentificationOutcome, OutcomeError, PersonRecord};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("record lookup failed: {0}")]
pub struct RecordLookupError(pub String);

/// Keyed store of person records.
pub trait RecordStore {
    /// Look up a record by normalized key (see [`normalize_key`]).
    fn find_by_normalized_key(&self, key: &str) -> Result<Option<PersonRecord>, RecordLookupError>;
}

/// What the caller should present for one identification.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    NoMatch,
    Identified {
        record: PersonRecord,
        confidence: f32,
    },
    /// Gallery matched but the store has no record for the identifier.
    MatchWithoutRecord {
        identifier: String,
        confidence: f32,
    },
    Failed {
        reason: OutcomeError,
    },
}

pub fn resolve<S: RecordStore + ?Sized>(outcome: IdentificationOutcome, store: &S) -> Resolution {
    let (identifier, confidence) = match outcome {
        IdentificationOutcome::NoMatch => return Resolution::NoMatch,
        IdentificationOutcome::Error { reason } => return Resolution::Failed { reason },
        IdentificationOutcome::Match {
            identifier,
            confidence,
        } => (identifier, confidence),
    };

    match store.find_by_normalized_key(&normalize_key(&identifier)) {
        Ok(Some(record)) => Resolution::Identified { record, confidence },
        Ok(None) => {
            tracing::warn!(
                identifier = %identifier,
                "gallery match has no record; gallery and record store are out of sync"
            );
            Resolution::MatchWithoutRecord {
                identifier,
                confidence,
            }
        }
        Err(e) => {
            tracing::error!(identifier = %identifier, error = %e, "record lookup failed");
            Resolution::Failed {
                reason: OutcomeError::Unexpected(e.to_string()),
            }
        }
    }
}
