//! fhir-query-builder: natural-language FHIR search query builder
//!
//! The pipeline runs in three steps, each an `async` call:
//! [`MetadataClient::fetch_searchable_resources`] loads what the server can
//! search, [`SelectTypesAgent::select_types`] maps free text onto candidate
//! resource types, and [`QuerySynthesizer::synthesize`] writes the query
//! string for the chosen type. The binary entrypoint is in `main.rs`.

pub mod ai;
pub mod config;
pub mod metadata;

pub use ai::{ClaudeClient, QuerySynthesizer, SelectTypesAgent};
pub use config::Config;
pub use metadata::{Credentials, MetadataClient, fetch_searchable_resources};

pub use fhir_query_core::{
    CreateQueryError, CreateQueryOutput, FhirMetadata, FhirQueryError, QuerySynthesis,
    ResourceMetadata, SearchParamType, SearchParameter, SelectTypeError, SelectedResourceType,
    TypeSelection, common_search_params, get_search_parameters,
};
