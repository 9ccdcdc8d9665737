//! Builder configuration

use std::time::Duration;

use fhir_query_core::{FhirQueryError, Result};

use crate::ai::ClaudeClient;
use crate::ai::client::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::metadata::{Credentials, MetadataClient};

pub const DEFAULT_SERVER_URL: &str = "https://r4.smarthealthit.org";
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for the FHIR server and the Claude API.
///
/// Library types never read the environment themselves; they are built from
/// a `Config` (or from explicit values).
#[derive(Clone)]
pub struct Config {
    pub fhir_server_url: String,
    pub fhir_username: Option<String>,
    pub fhir_password: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub metadata_timeout: Duration,
    pub inference_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fhir_server_url: DEFAULT_SERVER_URL.to_string(),
            fhir_username: None,
            fhir_password: None,
            anthropic_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fhir_server_url: env_string("FHIR_SERVER_URL").unwrap_or(defaults.fhir_server_url),
            fhir_username: env_string("FHIR_USERNAME"),
            fhir_password: env_string("FHIR_PASSWORD"),
            anthropic_api_key: env_string("ANTHROPIC_API_KEY"),
            model: env_string("ANTHROPIC_MODEL").unwrap_or(defaults.model),
            max_tokens: env_string("ANTHROPIC_MAX_TOKENS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
            metadata_timeout: env_secs("METADATA_TIMEOUT_SECS").unwrap_or(defaults.metadata_timeout),
            inference_timeout: env_secs("INFERENCE_TIMEOUT_SECS")
                .unwrap_or(defaults.inference_timeout),
        }
    }

    /// Basic-auth credentials, present when a username is configured.
    pub fn credentials(&self) -> Option<Credentials> {
        self.fhir_username.as_ref().map(|username| {
            Credentials::new(username, self.fhir_password.as_deref().unwrap_or_default())
        })
    }

    pub fn metadata_client(&self) -> Result<MetadataClient> {
        MetadataClient::new(self.metadata_timeout)
    }

    /// Claude client for the agents. Fails without an API key.
    pub fn claude_client(&self) -> Result<ClaudeClient> {
        let api_key = self.anthropic_api_key.clone().ok_or_else(|| {
            FhirQueryError::Config("ANTHROPIC_API_KEY is not set".to_string())
        })?;

        ClaudeClient::new(api_key)
            .with_model(&self.model)
            .with_max_tokens(self.max_tokens)
            .with_timeout(self.inference_timeout)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_string(name)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.fhir_server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.metadata_timeout, Duration::from_secs(10));
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn credentials_require_username() {
        let config = Config {
            fhir_password: Some("secret".into()),
            ..Config::default()
        };
        assert!(config.credentials().is_none());

        let config = Config {
            fhir_username: Some("clinician".into()),
            ..Config::default()
        };
        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.username, "clinician");
        assert_eq!(credentials.password, "");
    }

    #[test]
    fn claude_client_requires_api_key() {
        let err = Config::default().claude_client().err().unwrap();
        assert!(matches!(err, FhirQueryError::Config(_)));

        let config = Config {
            anthropic_api_key: Some("sk-test".into()),
            model: "claude-test".into(),
            ..Config::default()
        };
        assert_eq!(config.claude_client().unwrap().model(), "claude-test");
    }
}
