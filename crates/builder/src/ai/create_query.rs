//! Natural language to FHIR search query synthesis for one resource type

use std::time::Instant;

use chrono::NaiveDate;
use fhir_query_core::{
    CreateQueryError, CreateQueryOutput, FhirMetadata, FhirQueryError, QuerySynthesis, Result,
    SearchParameter, SearchUniverse,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use super::client::{ClaudeClient, Tool};
use super::output::{StructuredOutput, decode, structured_output};
use super::syntax::SYNTAX_REFERENCE;

const AGENT: &str = "create_query";
const SUBMIT_TOOL: &str = "submit_query";
const ERROR_TOOL: &str = "report_query_error";

#[derive(Deserialize)]
struct QueryInput {
    query_string: String,
}

/// Builds search query strings for a single target resource type.
pub struct QuerySynthesizer {
    client: ClaudeClient,
    universe: SearchUniverse,
    server_url: String,
    system_prompt: String,
    tools: Vec<Tool>,
}

impl QuerySynthesizer {
    /// Fails with `NotFound` when `target_type` is not searchable in `metadata`.
    pub fn new(
        client: ClaudeClient,
        target_type: &str,
        metadata: &FhirMetadata,
        common_params: &[SearchParameter],
    ) -> Result<Self> {
        let universe = SearchUniverse::new(target_type, metadata, common_params)?;
        let today = chrono::Utc::now().date_naive();
        let system_prompt = build_system_prompt(&universe, today);

        tracing::debug!(
            target_type = %target_type,
            parameters = universe.parameters().len(),
            includes = universe.include_values().len(),
            revincludes = universe.revinclude_values().len(),
            "Built query synthesis prompt"
        );

        Ok(Self {
            client,
            universe,
            server_url: metadata.server_url().to_string(),
            system_prompt,
            tools: output_tools(),
        })
    }

    pub fn target_type(&self) -> &str {
        self.universe.resource_type()
    }

    pub fn universe(&self) -> &SearchUniverse {
        &self.universe
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// `{server_url}/{target_type}?{query_string}`
    pub fn search_url(&self, output: &CreateQueryOutput) -> String {
        format!(
            "{}/{}?{}",
            self.server_url,
            self.target_type(),
            output.query_string()
        )
    }

    /// Turn `query` into a query string, or a structured error when the
    /// available parameters cannot express it.
    pub async fn synthesize(&self, query: &str) -> Result<QuerySynthesis> {
        let call_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(
            %call_id,
            agent = AGENT,
            target_type = %self.target_type(),
            query = %query,
            "Synthesizing search query"
        );

        let result = self.run(query).await;

        let outcome = match &result {
            Ok(QuerySynthesis::Query(output)) => {
                tracing::info!(%call_id, query_string = %output.query_string(), "Search query built");
                "query"
            }
            Ok(QuerySynthesis::Error(err)) => {
                tracing::info!(%call_id, error = %err.error, "Query could not be built");
                "query_error"
            }
            Err(e @ FhirQueryError::Protocol(_)) => {
                tracing::warn!(%call_id, error = %e, "Rejected query synthesis output");
                "protocol_error"
            }
            Err(e) => {
                tracing::warn!(%call_id, error = %e, "Query synthesis failed");
                "failed"
            }
        };
        super::record_call(AGENT, outcome, started);

        result
    }

    async fn run(&self, query: &str) -> Result<QuerySynthesis> {
        let response = self
            .client
            .structured(&self.system_prompt, query, &self.tools)
            .await?;
        let output = structured_output(&response, &self.tools)?;
        self.decode(output)
    }

    fn decode(&self, output: StructuredOutput) -> Result<QuerySynthesis> {
        match output {
            StructuredOutput::Tool { name, input } if name == SUBMIT_TOOL => self.accept(input),
            StructuredOutput::Tool { name, input } if name == ERROR_TOOL => {
                QuerySynthesis::from_error(decode(input, ERROR_TOOL)?)
            }
            StructuredOutput::Tool { name, .. } => Err(FhirQueryError::Protocol(format!(
                "unexpected output tool '{name}'"
            ))),
            StructuredOutput::Json(value) if value.get("query_string").is_some() => {
                self.accept(value)
            }
            StructuredOutput::Json(value) if value.get("error").is_some() => {
                let error: CreateQueryError = decode(value, ERROR_TOOL)?;
                QuerySynthesis::from_error(error)
            }
            StructuredOutput::Json(_) => Err(FhirQueryError::Protocol(
                "answer is neither a query string nor a query error".to_string(),
            )),
        }
    }

    /// Normalize a submitted query and hold it to the search universe. A
    /// token outside the universe becomes a `CreateQueryError`.
    fn accept(&self, input: JsonValue) -> Result<QuerySynthesis> {
        let input: QueryInput = decode(input, SUBMIT_TOOL)?;
        let output = CreateQueryOutput::new(&input.query_string, self.target_type())?;

        match self.universe.check(output.query_string()) {
            Ok(()) => Ok(QuerySynthesis::Query(output)),
            Err(violation) => {
                tracing::warn!(
                    target_type = %self.target_type(),
                    query_string = %output.query_string(),
                    violation = ?violation,
                    "Generated query uses tokens the server does not offer"
                );
                Ok(QuerySynthesis::Error(
                    self.universe.violation_error(&violation),
                ))
            }
        }
    }
}

fn output_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: SUBMIT_TOOL.to_string(),
            description: "Submit the FHIR search query string for the target resource type"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query_string": {
                        "type": "string",
                        "minLength": 1,
                        "description": "Query string to append after /{ResourceType}? with no leading '?', e.g. name=John&birthdate=gt1990-01-01"
                    }
                },
                "required": ["query_string"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: ERROR_TOOL.to_string(),
            description: "Report that no valid query can be built from the available parameters"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "error": {
                        "type": "string",
                        "description": "What prevents building a valid query"
                    },
                    "suggestion": {
                        "type": "string",
                        "description": "Alternative phrasing or correction the user could try"
                    }
                },
                "required": ["error"],
                "additionalProperties": false
            }),
        },
    ]
}

fn bullet_list<T: std::fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "  (none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_system_prompt(universe: &SearchUniverse, today: NaiveDate) -> String {
    let target = universe.resource_type();

    format!(
        r#"You are a FHIR query builder. Build a valid FHIR search query string for the '{target}' resource type.

TARGET RESOURCE TYPE: {target}
TODAY'S DATE: {today} (resolve relative dates such as "last year" against it)

AVAILABLE SEARCH PARAMETERS ({param_count} total):
{params}

AVAILABLE _include VALUES ({include_count} total):
{includes}

AVAILABLE _revinclude VALUES ({revinclude_count} total):
{revincludes}

{syntax}
Your task:
1. Work out what the user wants to find.
2. Choose search parameters from the list above.
3. Write the query with the correct syntax, applying prefixes, modifiers and AND/OR combination according to each parameter's type.
4. Call `{submit}` with the query string that follows /{target}? (no leading '?', no resource path, no server URL).
5. If the request needs a parameter, _include or _revinclude value that is not listed, or does not contain enough information for a valid query, call `{error}` with the reason and, where possible, a suggestion. Do not guess.

IMPORTANT:
- Only use search parameters, _include values and _revinclude values from the lists above
- Follow FHIR R4 search syntax
- Use the modifiers and prefixes that fit each parameter's type"#,
        target = target,
        today = today.format("%Y-%m-%d"),
        param_count = universe.parameters().len(),
        params = bullet_list(universe.parameters()),
        include_count = universe.include_values().len(),
        includes = bullet_list(universe.include_values()),
        revinclude_count = universe.revinclude_values().len(),
        revincludes = bullet_list(universe.revinclude_values()),
        syntax = SYNTAX_REFERENCE,
        submit = SUBMIT_TOOL,
        error = ERROR_TOOL,
    )
}
