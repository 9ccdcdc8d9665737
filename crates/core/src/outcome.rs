use serde::{Deserialize, Serialize};

/// Severity of the issue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// FHIR OperationOutcome, as returned by servers alongside error statuses.
/// Only read, never produced, by the query builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<IssueSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<OutcomeDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl OperationOutcome {
    /// Parse a response body, returning `None` unless it is an OperationOutcome.
    pub fn from_body(body: &str) -> Option<Self> {
        let outcome: Self = serde_json::from_str(body).ok()?;
        (outcome.resource_type.as_deref() == Some("OperationOutcome")).then_some(outcome)
    }

    /// One-line summary of the issues, e.g. `error: Unknown tenant`.
    pub fn summary(&self) -> Option<String> {
        let parts: Vec<String> = self
            .issue
            .iter()
            .filter_map(|issue| {
                let text = issue
                    .diagnostics
                    .as_deref()
                    .or_else(|| issue.details.as_ref().and_then(|d| d.text.as_deref()))
                    .or(issue.code.as_deref())?;
                Some(match issue.severity {
                    Some(severity) => format!("{}: {}", severity.as_str(), text),
                    None => text.to_string(),
                })
            })
            .collect();

        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "information",
        }
    }
}
