//! fhir-query-core: FHIR server metadata and query-builder contracts
//!
//! This crate holds everything the query builder knows without touching the
//! network: CapabilityStatement parsing and normalization, the common search
//! parameter catalog, the per-type search universe, and the closed result
//! shapes of the type-selection and query-synthesis agents.

pub mod capability;
pub mod catalog;
pub mod error;
pub mod metadata;
pub mod outcome;
pub mod query;

pub use capability::CapabilityStatement;
pub use catalog::{SearchUniverse, UniverseViolation, common_search_params, merge_search_params};
pub use error::{FhirQueryError, Result};
pub use metadata::{
    FhirMetadata, ResourceMetadata, SEARCH_TYPE, SearchParamType, SearchParameter,
    get_search_parameters,
};
pub use outcome::{IssueSeverity, OperationOutcome};
pub use query::{
    CreateQueryError, CreateQueryOutput, QuerySynthesis, SelectTypeError, SelectedResourceType,
    TypeSelection,
};
