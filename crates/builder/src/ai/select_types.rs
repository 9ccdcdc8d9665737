//! Natural language to FHIR resource type selection

use std::sync::Arc;
use std::time::Instant;

use fhir_query_core::{
    FhirMetadata, FhirQueryError, Result, SelectTypeError, SelectedResourceType, TypeSelection,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use super::client::{ClaudeClient, Tool};
use super::output::{StructuredOutput, decode, structured_output};

const AGENT: &str = "select_types";
const SELECT_TOOL: &str = "select_resource_types";
const ERROR_TOOL: &str = "report_selection_error";

#[derive(Deserialize)]
struct CandidatesInput {
    candidates: Vec<SelectedResourceType>,
}

/// Maps free text onto candidate resource types of one server.
///
/// The prompt and output schema are built once from the metadata; each
/// [`select_types`](Self::select_types) call is independent.
pub struct SelectTypesAgent {
    client: ClaudeClient,
    metadata: Arc<FhirMetadata>,
    system_prompt: String,
    tools: Vec<Tool>,
}

impl SelectTypesAgent {
    pub fn new(client: ClaudeClient, metadata: Arc<FhirMetadata>) -> Self {
        let system_prompt = build_system_prompt(&metadata);
        let tools = output_tools(&metadata);
        Self {
            client,
            metadata,
            system_prompt,
            tools,
        }
    }

    pub fn metadata(&self) -> &FhirMetadata {
        &self.metadata
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Rank the resource types that could answer `query`, or explain why none can.
    pub async fn select_types(&self, query: &str) -> Result<TypeSelection> {
        let call_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(%call_id, agent = AGENT, query = %query, "Selecting resource types");

        let result = self.run(query).await;

        let outcome = match &result {
            Ok(TypeSelection::Candidates(candidates)) => {
                tracing::info!(
                    %call_id,
                    candidates = candidates.len(),
                    top = candidates.first().map(|c| c.selected_type.as_str()).unwrap_or_default(),
                    "Resource types selected"
                );
                "candidates"
            }
            Ok(TypeSelection::Error(err)) => {
                tracing::info!(%call_id, error = %err.error, "No resource type matched");
                "selection_error"
            }
            Err(e @ FhirQueryError::Protocol(_)) => {
                tracing::warn!(%call_id, error = %e, "Rejected type selection output");
                "protocol_error"
            }
            Err(e) => {
                tracing::warn!(%call_id, error = %e, "Type selection failed");
                "failed"
            }
        };
        super::record_call(AGENT, outcome, started);

        result
    }

    async fn run(&self, query: &str) -> Result<TypeSelection> {
        let response = self
            .client
            .structured(&self.system_prompt, query, &self.tools)
            .await?;
        let output = structured_output(&response, &self.tools)?;
        self.decode(output)
    }

    fn decode(&self, output: StructuredOutput) -> Result<TypeSelection> {
        match output {
            StructuredOutput::Tool { name, input } if name == SELECT_TOOL => {
                let input: CandidatesInput = decode(input, SELECT_TOOL)?;
                TypeSelection::from_candidates(input.candidates, &self.metadata)
            }
            StructuredOutput::Tool { name, input } if name == ERROR_TOOL => {
                TypeSelection::from_error(decode(input, ERROR_TOOL)?)
            }
            StructuredOutput::Tool { name, .. } => Err(FhirQueryError::Protocol(format!(
                "unexpected output tool '{name}'"
            ))),
            StructuredOutput::Json(value) => self.decode_json(value),
        }
    }

    /// Text answers: a candidate array, `{"candidates": [...]}`, an error
    /// object, or an error wrapped in a one-element array.
    fn decode_json(&self, value: JsonValue) -> Result<TypeSelection> {
        let value = match value {
            JsonValue::Array(mut items) if items.len() == 1 && items[0].get("error").is_some() => {
                items.remove(0)
            }
            other => other,
        };

        if value.is_array() {
            let candidates: Vec<SelectedResourceType> = decode(value, SELECT_TOOL)?;
            return TypeSelection::from_candidates(candidates, &self.metadata);
        }
        if value.get("candidates").is_some() {
            let input: CandidatesInput = decode(value, SELECT_TOOL)?;
            return TypeSelection::from_candidates(input.candidates, &self.metadata);
        }
        if value.get("error").is_some() {
            let error: SelectTypeError = decode(value, ERROR_TOOL)?;
            return TypeSelection::from_error(error);
        }
        Err(FhirQueryError::Protocol(
            "answer is neither a candidate list nor a selection error".to_string(),
        ))
    }
}

fn output_tools(metadata: &FhirMetadata) -> Vec<Tool> {
    let types = metadata.sorted_types();
    let mut selected_type = json!({
        "type": "string",
        "description": "Resource type name, exactly as listed"
    });
    if !types.is_empty() {
        selected_type["enum"] = json!(types);
    }

    vec![
        Tool {
            name: SELECT_TOOL.to_string(),
            description: "Return the candidate resource types for the request, most relevant first"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "candidates": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "selected_type": selected_type,
                                "confidence": {
                                    "type": "number",
                                    "minimum": 0.0,
                                    "maximum": 1.0,
                                    "description": "Confidence for this type alone (0.0-1.0)"
                                },
                                "reasoning": {
                                    "type": "string",
                                    "minLength": 1,
                                    "description": "Why this type matches the request"
                                }
                            },
                            "required": ["selected_type", "confidence", "reasoning"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["candidates"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: ERROR_TOOL.to_string(),
            description: "Report that no available resource type matches the request".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "error": {
                        "type": "string",
                        "description": "Short description of what went wrong"
                    },
                    "reasoning": {
                        "type": "string",
                        "description": "Why no available type fits"
                    }
                },
                "required": ["error", "reasoning"],
                "additionalProperties": false
            }),
        },
    ]
}

fn build_system_prompt(metadata: &FhirMetadata) -> String {
    let types = metadata.sorted_types();

    format!(
        r#"You are a FHIR resource type selector. Analyze the user's request and select the FHIR resource type(s) that hold the data they want.

Available searchable resource types ({count} total):
{types}

Your task:
1. Work out what data the user is asking for.
2. Pick the matching resource type(s) from the list above. Never use a type that is not listed.
3. Answer by calling `{select}` with one candidate per plausible interpretation. Each candidate has:
   - selected_type: the resource type name
   - confidence: your confidence for this type on its own (0.0-1.0)
   - reasoning: why this type in particular matches
4. Order the candidates most relevant first.

Confidence guidelines (per type):
- 0.9-1.0: type named outright, or an unmistakable semantic match
- 0.7-0.9: clear semantic match with good context
- 0.5-0.7: reasonable match with some ambiguity
- 0.3-0.5: one of several valid options
- 0.0-0.3: weak guess

Common mappings (use them only when the type is in the list above):
- "patients", "patient demographics", "people" -> Patient
- "vital signs", "blood pressure", "lab results", "observations" -> Observation
- "medications", "prescriptions", "drugs" -> Medication, MedicationRequest
- "encounters", "visits", "appointments" -> Encounter
- "procedures", "surgeries", "operations" -> Procedure
- "conditions", "diagnoses", "problems", "diseases" -> Condition
- "allergies" -> AllergyIntolerance
- "immunizations", "vaccinations" -> Immunization

Ambiguity and errors:
- If the request fits several resource families, return several candidates, each with its own confidence and reasoning, rather than picking one arbitrarily.
- If the request is vague, return the most likely types with lower confidence.
- If no listed type plausibly matches (for example the request names a type that does not exist here), call `{error}` with an error message and your reasoning instead of guessing.

Examples:
- "Find patients" -> {select}: Patient (0.95, direct match)
- "Get medication data" -> {select}: MedicationRequest (0.8, most likely prescriptions), Medication (0.7, could be medication definitions)
- "Find XYZ records" -> {error}: "Type 'XYZ' not found", no listed type resembles XYZ"#,
        count = types.len(),
        types = types.join("\n"),
        select = SELECT_TOOL,
        error = ERROR_TOOL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> SelectTypesAgent {
        let resources: Vec<JsonValue> = ["Patient", "Medication", "MedicationRequest", "Observation"]
            .iter()
            .map(|t| json!({"type": t, "interaction": [{"code": "search-type"}]}))
            .collect();
        let metadata = FhirMetadata::from_json(
            json!({"rest": [{"mode": "server", "resource": resources}]}),
            "http://fhir.test",
        )
        .unwrap();
        SelectTypesAgent::new(ClaudeClient::new("test-key"), Arc::new(metadata))
    }

    #[test]
    fn prompt_lists_sorted_types() {
        let agent = agent();
        let prompt = agent.system_prompt();
        assert!(prompt.contains("(4 total):\nMedication\nMedicationRequest\nObservation\nPatient\n"));
        assert!(prompt.contains(SELECT_TOOL));
        assert!(prompt.contains(ERROR_TOOL));
    }

    #[test]
    fn schema_enumerates_types() {
        let agent = agent();
        let schema = &agent.tools[0].input_schema;
        assert_eq!(
            schema["properties"]["candidates"]["items"]["properties"]["selected_type"]["enum"],
            json!(["Medication", "MedicationRequest", "Observation", "Patient"])
        );
    }

    #[test]
    fn decodes_candidates_tool() {
        let selection = agent()
            .decode(StructuredOutput::Tool {
                name: SELECT_TOOL.into(),
                input: json!({"candidates": [
                    {"selected_type": "MedicationRequest", "confidence": 0.8, "reasoning": "prescriptions"},
                    {"selected_type": "Medication", "confidence": 0.7, "reasoning": "definitions"}
                ]}),
            })
            .unwrap();
        match selection {
            TypeSelection::Candidates(c) => {
                assert_eq!(c.len(), 2);
                assert_eq!(c[0].selected_type, "MedicationRequest");
            }
            TypeSelection::Error(e) => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn decodes_error_tool() {
        let selection = agent()
            .decode(StructuredOutput::Tool {
                name: ERROR_TOOL.into(),
                input: json!({"error": "Type 'XYZ' not found", "reasoning": "No such type"}),
            })
            .unwrap();
        assert!(matches!(selection, TypeSelection::Error(e) if e.error.contains("XYZ")));
    }

    #[test]
    fn rejects_unlisted_type_and_bad_shapes() {
        let agent = agent();
        let outputs = [
            StructuredOutput::Tool {
                name: SELECT_TOOL.into(),
                input: json!({"candidates": [{"selected_type": "XYZ", "confidence": 0.9, "reasoning": "?"}]}),
            },
            StructuredOutput::Tool {
                name: SELECT_TOOL.into(),
                input: json!({"candidates": []}),
            },
            StructuredOutput::Tool {
                name: SELECT_TOOL.into(),
                input: json!({"candidates": [{"selected_type": "Patient", "reasoning": "no score"}]}),
            },
            StructuredOutput::Tool {
                name: "submit_query".into(),
                input: json!({}),
            },
            StructuredOutput::Json(json!({"answer": "Patient"})),
        ];
        for output in outputs {
            let result = agent.decode(output.clone());
            assert!(matches!(result, Err(FhirQueryError::Protocol(_))), "{output:?}");
        }
    }

    #[test]
    fn decodes_text_fallbacks() {
        let agent = agent();

        let list = agent
            .decode(StructuredOutput::Json(json!([
                {"selected_type": "Observation", "confidence": 0.92, "reasoning": "blood pressure readings"}
            ])))
            .unwrap();
        assert_eq!(list.top().unwrap().selected_type, "Observation");

        let wrapped_error = agent
            .decode(StructuredOutput::Json(json!([
                {"error": "Type 'XYZ' not found", "reasoning": "not listed"}
            ])))
            .unwrap();
        assert!(matches!(wrapped_error, TypeSelection::Error(_)));
    }
}
