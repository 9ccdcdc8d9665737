//! CapabilityStatement client for `GET [base]/metadata`

use std::fmt;
use std::time::Duration;

use fhir_query_core::{FhirMetadata, FhirQueryError, OperationOutcome, Result};
use reqwest::header::ACCEPT;
use serde_json::Value as JsonValue;

use crate::config::DEFAULT_METADATA_TIMEOUT;

/// HTTP basic-auth credentials for the FHIR server
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fetches and normalizes server metadata
#[derive(Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
}

impl MetadataClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FhirQueryError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Fetch `{base_url}/metadata` and keep the resource types that support
    /// `search-type`. `base_url` is used verbatim, both for the request and
    /// as the snapshot's `server_url`.
    pub async fn fetch_searchable_resources(
        &self,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<FhirMetadata> {
        let url = format!("{base_url}/metadata");
        tracing::info!(url = %url, authenticated = credentials.is_some(), "Fetching FHIR server metadata");

        let result = self
            .fetch(&url, credentials)
            .await
            .and_then(|body| FhirMetadata::from_json(body, base_url));

        let outcome = match &result {
            Ok(metadata) => {
                tracing::info!(
                    searchable = metadata.len(),
                    fhir_version = metadata.fhir_version().unwrap_or("unknown"),
                    "Loaded FHIR server metadata"
                );
                "ok"
            }
            Err(e @ FhirQueryError::Schema(_)) => {
                tracing::warn!(url = %url, error = %e, "Metadata response is not a usable CapabilityStatement");
                "schema_error"
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Metadata request failed");
                "transport_error"
            }
        };
        metrics::counter!("fhir_query_metadata_fetches_total", "outcome" => outcome).increment(1);

        result
    }

    async fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> Result<JsonValue> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "application/fhir+json, application/json");
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(url, None, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = OperationOutcome::from_body(&body)
                .and_then(|outcome| outcome.summary())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(transport_error(url, Some(status.as_u16()), message));
        }

        response.json::<JsonValue>().await.map_err(|e| {
            transport_error(
                url,
                Some(status.as_u16()),
                format!("response body is not valid JSON: {e}"),
            )
        })
    }
}

/// Fetch metadata with a default client (10 second timeout).
pub async fn fetch_searchable_resources(
    base_url: &str,
    credentials: Option<&Credentials>,
) -> Result<FhirMetadata> {
    MetadataClient::new(DEFAULT_METADATA_TIMEOUT)?
        .fetch_searchable_resources(base_url, credentials)
        .await
}

fn transport_error(url: &str, status: Option<u16>, message: String) -> FhirQueryError {
    FhirQueryError::Transport {
        url: url.to_string(),
        status,
        message,
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out ({err})")
    } else if err.is_connect() {
        format!("connection failed ({err})")
    } else {
        err.to_string()
    }
}
