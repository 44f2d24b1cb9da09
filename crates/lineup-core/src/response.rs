//! Caller-facing response payloads.

use crate::resolve::Resolution;
use crate::types::{OutcomeError, PersonRecord};
use serde::{Deserialize, Serialize};

const UNEXPECTED_MESSAGE: &str = "internal error during identification";

/// One response per identification request, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum IdentifyResponse {
    #[serde(rename = "Match Found")]
    MatchFound {
        confidence: f32,
        record: PersonRecord,
        message: String,
    },
    #[serde(rename = "No Match Found")]
    NoMatch { message: String },
    #[serde(rename = "No Match Found in Database")]
    MatchWithoutRecord {
        identifier: String,
        confidence: f32,
        message: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl IdentifyResponse {
    /// Response for a request rejected before identification started.
    pub fn input_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn unexpected() -> Self {
        Self::Error {
            message: UNEXPECTED_MESSAGE.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::MatchFound { message, .. }
            | Self::NoMatch { message }
            | Self::MatchWithoutRecord { message, .. }
            | Self::Error { message } => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "response serialization failed");
            format!(r#"{{"status":"error","message":"{UNEXPECTED_MESSAGE}"}}"#)
        })
    }
}

impl From<Resolution> for IdentifyResponse {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Identified { record, confidence } => Self::MatchFound {
                confidence: round_confidence(confidence),
                message: format_record(&record),
                record,
            },
            Resolution::NoMatch => Self::NoMatch {
                message: "No match found in criminal database.".into(),
            },
            Resolution::MatchWithoutRecord {
                identifier,
                confidence,
            } => Self::MatchWithoutRecord {
                identifier,
                confidence: round_confidence(confidence),
                message: "No record in database for matched image.".into(),
            },
            Resolution::Failed { reason } => match reason {
                OutcomeError::InputUnreadable { .. } => {
                    Self::input_error("Uploaded image could not be read.")
                }
                OutcomeError::Cancelled => Self::input_error("Identification was cancelled."),
                OutcomeError::Unexpected(_) => Self::unexpected(),
            },
        }
    }
}

/// Round to two decimal places.
pub fn round_confidence(confidence: f32) -> f32 {
    (confidence * 100.0).round() / 100.0
}

/// Human-readable summary block for an identified person.
pub fn format_record(record: &PersonRecord) -> String {
    let release = record
        .release_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "N/A".into());
    format!(
        "Person Identified\n\
         ----------------------------\n\
         Name: {}\n\
         Age: {}\n\
         Gender: {}\n\
         Crimes: {}\n\
         Status: {}\n\
         Last Address: {}\n\
         Release Date: {}",
        title_case(&record.name.replace('_', " ")),
        record.age,
        record.gender,
        record.crimes.join(", "),
        record.status,
        record.last_known_address,
        release,
    )
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
