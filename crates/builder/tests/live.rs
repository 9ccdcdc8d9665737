//! End-to-end scenarios against the public SMART sandbox and the live
//! Messages API.
//!
//! Run with: ANTHROPIC_API_KEY=... cargo test -p fhir-query-builder --test live -- --ignored

use std::sync::Arc;

use fhir_query_builder::{
    Config, FhirMetadata, QuerySynthesis, QuerySynthesizer, SelectTypesAgent, TypeSelection,
    common_search_params,
};

async fn setup() -> (Config, Arc<FhirMetadata>) {
    let config = Config::from_env();
    assert!(
        config.anthropic_api_key.is_some(),
        "ANTHROPIC_API_KEY must be set for live tests"
    );
    let metadata = config
        .metadata_client()
        .expect("Failed to build metadata client")
        .fetch_searchable_resources(&config.fhir_server_url, config.credentials().as_ref())
        .await
        .expect("Failed to fetch server metadata");
    (config, Arc::new(metadata))
}

fn synthesizer(config: &Config, metadata: &FhirMetadata, target: &str) -> QuerySynthesizer {
    QuerySynthesizer::new(
        config.claude_client().expect("client"),
        target,
        metadata,
        &common_search_params(),
    )
    .expect("target type should be searchable")
}

#[tokio::test]
#[ignore]
async fn patients_born_after_1990() {
    let (config, metadata) = setup().await;
    let agent = SelectTypesAgent::new(config.claude_client().unwrap(), Arc::clone(&metadata));

    let selection = agent
        .select_types("Find all patients born after 1990")
        .await
        .unwrap();
    let top = selection.top().expect("expected candidates");
    assert_eq!(top.selected_type, "Patient");
    assert!(top.confidence >= 0.9, "confidence {}", top.confidence);

    let synthesis = synthesizer(&config, &metadata, "Patient")
        .synthesize("Find all patients born after 1990")
        .await
        .unwrap();
    let query = synthesis.query_string().expect("expected a query");
    assert!(query.contains("birthdate"), "query: {query}");
    assert!(query.contains("gt") || query.contains("ge"), "query: {query}");
    assert!(query.contains("1990"), "query: {query}");
}

#[tokio::test]
#[ignore]
async fn nonsense_request_is_selection_error() {
    let (config, metadata) = setup().await;
    let agent = SelectTypesAgent::new(config.claude_client().unwrap(), metadata);

    let selection = agent.select_types("Find all XYZ").await.unwrap();
    assert!(matches!(selection, TypeSelection::Error(_)), "got {selection:?}");
}

#[tokio::test]
#[ignore]
async fn unsupported_criterion_is_query_error() {
    let (config, metadata) = setup().await;

    let synthesis = synthesizer(&config, &metadata, "Patient")
        .synthesize("Find patients whose favorite color is blue")
        .await
        .unwrap();
    assert!(matches!(synthesis, QuerySynthesis::Error(_)), "got {synthesis:?}");
}

#[tokio::test]
#[ignore]
async fn medication_data_is_ambiguous() {
    let (config, metadata) = setup().await;
    let agent = SelectTypesAgent::new(config.claude_client().unwrap(), metadata);

    let selection = agent.select_types("Get medication data").await.unwrap();
    match selection {
        TypeSelection::Candidates(candidates) => {
            assert!(candidates.len() >= 2, "candidates: {candidates:?}");
            assert!(
                candidates
                    .iter()
                    .all(|c| c.selected_type.starts_with("Medication"))
            );
        }
        other => panic!("Expected candidates, got {other:?}"),
    }
}
