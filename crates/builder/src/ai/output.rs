//! Decoding structured model output.
//!
//! Agents offer one tool per output variant and force a tool call. A
//! well-behaved response is therefore a single `tool_use` block; a plain-text
//! answer carrying JSON is accepted as a fallback.

use fhir_query_core::{FhirQueryError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::client::{ApiResponse, ContentBlock, Tool};

/// The raw structured answer, before it is decoded into a result variant
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput {
    /// The model called one of the offered output tools
    Tool { name: String, input: JsonValue },
    /// The model answered in text; this is the JSON found in it
    Json(JsonValue),
}

/// Pull the structured answer out of a Messages API response.
pub fn structured_output(response: &ApiResponse, tools: &[Tool]) -> Result<StructuredOutput> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        return Err(FhirQueryError::Protocol(
            "model output was truncated at max_tokens".to_string(),
        ));
    }

    let mut text = String::new();
    for block in &response.content {
        match block {
            ContentBlock::ToolUse { name, input, .. } => {
                if !tools.iter().any(|tool| &tool.name == name) {
                    return Err(FhirQueryError::Protocol(format!(
                        "model called unknown tool '{name}'"
                    )));
                }
                return Ok(StructuredOutput::Tool {
                    name: name.clone(),
                    input: input.clone(),
                });
            }
            ContentBlock::Text { text: chunk } => text.push_str(chunk),
            ContentBlock::Other => {}
        }
    }

    if text.trim().is_empty() {
        return Err(FhirQueryError::Protocol(
            "response contained neither a tool call nor text".to_string(),
        ));
    }

    let json_str = extract_json(&text)?;
    serde_json::from_str(&json_str)
        .map(StructuredOutput::Json)
        .map_err(|e| FhirQueryError::Protocol(format!("Failed to parse model output: {}", e)))
}

/// Deserialize a tool input or JSON answer into one variant's shape.
pub fn decode<T: DeserializeOwned>(value: JsonValue, variant: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| FhirQueryError::Protocol(format!("invalid {variant} output: {e}")))
}

/// Extract a JSON object or array from text that might contain markdown code blocks
fn extract_json(text: &str) -> Result<String> {
    let trimmed = text.trim();

    // Direct JSON
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed.to_string());
    }

    // Wrapped in ```json ... ```
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return Ok(after[..end].trim().to_string());
        }
    }

    // Wrapped in ``` ... ```
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return Ok(after[..end].trim().to_string());
        }
    }

    Err(FhirQueryError::Protocol(format!(
        "Could not extract JSON from response: {}",
        trimmed
    )))
}
