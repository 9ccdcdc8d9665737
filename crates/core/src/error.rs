use thiserror::Error;

/// Errors raised by the query-builder pipeline.
///
/// Agent-level "could not satisfy the request" outcomes are not errors; they
/// are variants of [`crate::TypeSelection`] and [`crate::QuerySynthesis`].
#[derive(Debug, Error)]
pub enum FhirQueryError {
    /// The metadata request could not complete (connection, timeout, HTTP status).
    #[error("Failed to fetch metadata from {url}{}: {message}", status_suffix(.status))]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// The metadata response is JSON but not a usable CapabilityStatement.
    #[error("Invalid CapabilityStatement: {0}")]
    Schema(String),

    #[error(
        "Resource type '{resource_type}' not found in metadata. Available types include: {}...",
        .alternatives.join(", ")
    )]
    NotFound {
        resource_type: String,
        alternatives: Vec<String>,
    },

    /// The model answered with something outside the closed output shape.
    #[error("Malformed model output: {0}")]
    Protocol(String),

    /// The inference request itself failed.
    #[error("Inference request failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, FhirQueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_includes_status_when_known() {
        let err = FhirQueryError::Transport {
            url: "http://fhir.test/metadata".into(),
            status: Some(503),
            message: "Service Unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch metadata from http://fhir.test/metadata (HTTP 503): Service Unavailable"
        );
    }

    #[test]
    fn transport_message_without_status() {
        let err = FhirQueryError::Transport {
            url: "http://fhir.test/metadata".into(),
            status: None,
            message: "timed out".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch metadata from http://fhir.test/metadata: timed out"
        );
    }

    #[test]
    fn not_found_lists_alternatives() {
        let err = FhirQueryError::NotFound {
            resource_type: "Nope".into(),
            alternatives: vec!["Encounter".into(), "Patient".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'Nope' not found in metadata"));
        assert!(msg.contains("Encounter, Patient"));
    }
}
