//! LLM agents powered by the Claude API

pub mod client;
pub mod create_query;
pub mod output;
pub mod select_types;
mod syntax;

use std::time::Instant;

pub use client::ClaudeClient;
pub use create_query::QuerySynthesizer;
pub use select_types::SelectTypesAgent;

/// Records `fhir_query_agent_calls_total` and `fhir_query_agent_call_duration_seconds`.
fn record_call(agent: &'static str, outcome: &'static str, started: Instant) {
    metrics::counter!(
        "fhir_query_agent_calls_total",
        "agent" => agent,
        "outcome" => outcome
    )
    .increment(1);

    metrics::histogram!("fhir_query_agent_call_duration_seconds", "agent" => agent)
        .record(started.elapsed().as_secs_f64());
}
