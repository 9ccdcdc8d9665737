//! Closed result shapes of the two agent calls.
//!
//! Each call yields exactly one of two variants. "The model could not
//! satisfy the request" is a normal [`TypeSelection::Error`] or
//! [`QuerySynthesis::Error`] value; output that fits neither shape is a
//! [`FhirQueryError::Protocol`] error.

use serde::{Deserialize, Serialize};

use crate::error::{FhirQueryError, Result};
use crate::metadata::FhirMetadata;

/// One candidate resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedResourceType {
    pub selected_type: String,
    /// In `[0.0, 1.0]`
    pub confidence: f64,
    pub reasoning: String,
}

/// Type selection found nothing suitable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectTypeError {
    pub error: String,
    pub reasoning: String,
}

/// Result of type selection: at least one candidate, most relevant first, or an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSelection {
    Candidates(Vec<SelectedResourceType>),
    Error(SelectTypeError),
}

impl TypeSelection {
    /// Validate model-produced candidates against the metadata they were
    /// selected from. The agent's ordering is kept as is.
    pub fn from_candidates(
        candidates: Vec<SelectedResourceType>,
        metadata: &FhirMetadata,
    ) -> Result<Self> {
        if candidates.is_empty() {
            return Err(FhirQueryError::Protocol(
                "type selection returned an empty candidate list".to_string(),
            ));
        }

        for candidate in &candidates {
            if !metadata.contains_type(&candidate.selected_type) {
                return Err(FhirQueryError::Protocol(format!(
                    "selected type '{}' is not a searchable type on {}",
                    candidate.selected_type,
                    metadata.server_url()
                )));
            }
            if !(0.0..=1.0).contains(&candidate.confidence) {
                return Err(FhirQueryError::Protocol(format!(
                    "confidence {} for '{}' is outside [0, 1]",
                    candidate.confidence, candidate.selected_type
                )));
            }
            if candidate.reasoning.trim().is_empty() {
                return Err(FhirQueryError::Protocol(format!(
                    "candidate '{}' has no reasoning",
                    candidate.selected_type
                )));
            }
        }

        Ok(Self::Candidates(candidates))
    }

    pub fn from_error(error: SelectTypeError) -> Result<Self> {
        if error.error.trim().is_empty() || error.reasoning.trim().is_empty() {
            return Err(FhirQueryError::Protocol(
                "selection error must carry a message and reasoning".to_string(),
            ));
        }
        Ok(Self::Error(error))
    }

    /// Most relevant candidate, if any.
    pub fn top(&self) -> Option<&SelectedResourceType> {
        match self {
            Self::Candidates(candidates) => candidates.first(),
            Self::Error(_) => None,
        }
    }
}

/// A query string fragment, meant to follow `{server}/{Type}?`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateQueryOutput {
    query_string: String,
}

impl CreateQueryOutput {
    /// Trim the model's answer and strip any `?`, `Type?`, `/Type?` or
    /// absolute URL prefix. A prefix naming a type other than `resource_type`
    /// and an empty remainder are protocol errors.
    pub fn new(raw: &str, resource_type: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let fragment = match trimmed.find('?') {
            Some(idx) if !trimmed[..idx].contains('=') => {
                let target = trimmed[..idx]
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or("");
                if !target.is_empty() && target != resource_type {
                    return Err(FhirQueryError::Protocol(format!(
                        "query_string targets '{target}' instead of {resource_type}"
                    )));
                }
                trimmed[idx + 1..].trim()
            }
            _ => trimmed,
        };

        if fragment.is_empty() {
            return Err(FhirQueryError::Protocol(
                "query_string must not be empty".to_string(),
            ));
        }

        Ok(Self {
            query_string: fragment.to_string(),
        })
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }
}

/// Query synthesis could not produce a valid query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateQueryError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Result of query synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySynthesis {
    Query(CreateQueryOutput),
    Error(CreateQueryError),
}

impl QuerySynthesis {
    pub fn from_error(mut error: CreateQueryError) -> Result<Self> {
        if error.error.trim().is_empty() {
            return Err(FhirQueryError::Protocol(
                "query error must carry a message".to_string(),
            ));
        }
        error.suggestion = error.suggestion.filter(|s| !s.trim().is_empty());
        Ok(Self::Error(error))
    }

    pub fn query_string(&self) -> Option<&str> {
        match self {
            Self::Query(output) => Some(output.query_string()),
            Self::Error(_) => None,
        }
    }
}
