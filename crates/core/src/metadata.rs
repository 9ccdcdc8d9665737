//! Normalized view of a server's search capabilities.
//!
//! [`FhirMetadata`] is built once from a CapabilityStatement and then only
//! read: the agents share it behind an `Arc` for the rest of the session.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::capability::{CapabilityResource, CapabilityStatement};
use crate::error::{FhirQueryError, Result};

/// Interaction code a resource must declare to be searchable.
pub const SEARCH_TYPE: &str = "search-type";

/// Number of alternative type names quoted in not-found errors.
const MAX_ALTERNATIVES: usize = 10;

/// FHIR search parameter type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    Number,
    Date,
    String,
    Token,
    Reference,
    Quantity,
    Uri,
    Special,
    Composite,
}

impl SearchParamType {
    /// Map a CapabilityStatement `searchParam.type` code. Unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "string" => Some(Self::String),
            "token" => Some(Self::Token),
            "reference" => Some(Self::Reference),
            "quantity" => Some(Self::Quantity),
            "uri" => Some(Self::Uri),
            "special" => Some(Self::Special),
            "composite" => Some(Self::Composite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Date => "date",
            Self::String => "string",
            Self::Token => "token",
            Self::Reference => "reference",
            Self::Quantity => "quantity",
            Self::Uri => "uri",
            Self::Special => "special",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queryable field on a resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameter {
    pub name: String,
    /// `None` when the server gave no type or one outside the FHIR set
    #[serde(rename = "type")]
    pub kind: Option<SearchParamType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl SearchParameter {
    pub fn new(
        name: impl Into<String>,
        kind: Option<SearchParamType>,
        documentation: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            documentation: documentation.map(str::to_string),
        }
    }
}

/// Prompt-friendly rendering: `birthdate (date): The patient's date of birth`
impl fmt::Display for SearchParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind.unwrap_or(SearchParamType::Special);
        match &self.documentation {
            Some(doc) => write!(f, "{} ({}): {}", self.name, kind, doc),
            None => write!(f, "{} ({})", self.name, kind),
        }
    }
}

/// Search capabilities of one resource type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub interactions: Vec<String>,
    /// Sorted by name; may contain duplicates if the server lists them
    pub search_params: Vec<SearchParameter>,
    pub include_values: Vec<String>,
    pub revinclude_values: Vec<String>,
}

impl ResourceMetadata {
    pub fn supports(&self, interaction: &str) -> bool {
        self.interactions.iter().any(|code| code == interaction)
    }

    fn from_capability(
        resource: CapabilityResource,
        resource_type: String,
        interactions: Vec<String>,
    ) -> Self {
        let mut search_params: Vec<SearchParameter> = resource
            .search_param
            .into_iter()
            .filter_map(|param| {
                let Some(name) = param.name.filter(|n| !n.is_empty()) else {
                    tracing::debug!(resource_type = %resource_type, "Skipping unnamed search parameter");
                    return None;
                };
                Some(SearchParameter {
                    name,
                    kind: param.param_type.as_deref().and_then(SearchParamType::from_code),
                    documentation: param.documentation,
                })
            })
            .collect();
        search_params.sort_by(|a, b| a.name.cmp(&b.name));

        let mut include_values = resource.search_include;
        include_values.sort();
        let mut revinclude_values = resource.search_rev_include;
        revinclude_values.sort();

        Self {
            resource_type,
            profile: resource.profile,
            interactions,
            search_params,
            include_values,
            revinclude_values,
        }
    }
}

/// Immutable snapshot of one server's searchable resource types
#[derive(Debug, Clone, Serialize)]
pub struct FhirMetadata {
    /// Keyed by type name in discovery order; the keys are the searchable types
    resource_metadata: IndexMap<String, ResourceMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fhir_version: Option<String>,
    server_url: String,
}

impl FhirMetadata {
    /// Parse a raw `/metadata` response body.
    pub fn from_json(value: JsonValue, server_url: impl Into<String>) -> Result<Self> {
        if !value.is_object() {
            return Err(FhirQueryError::Schema(
                "expected a JSON object at the top level".to_string(),
            ));
        }
        let statement: CapabilityStatement = serde_json::from_value(value)
            .map_err(|e| FhirQueryError::Schema(e.to_string()))?;
        Self::from_capability_statement(statement, server_url)
    }

    /// Keep only resources that declare `search-type`, with parameters and
    /// include lists sorted.
    pub fn from_capability_statement(
        statement: CapabilityStatement,
        server_url: impl Into<String>,
    ) -> Result<Self> {
        let rest = statement.rest.unwrap_or_default();
        if rest.is_empty() {
            return Err(FhirQueryError::Schema("missing 'rest' array".to_string()));
        }

        let server = rest.into_iter().find(|r| r.is_server()).ok_or_else(|| {
            FhirQueryError::Schema(
                "FHIR server does not expose capability information (no rest entry with mode 'server')"
                    .to_string(),
            )
        })?;

        let resources = server.resource.ok_or_else(|| {
            FhirQueryError::Schema("missing 'resource' array in server rest entry".to_string())
        })?;

        let mut resource_metadata: IndexMap<String, ResourceMetadata> = IndexMap::new();
        for resource in resources {
            let Some(resource_type) = resource.resource_type.clone().filter(|t| !t.is_empty())
            else {
                continue;
            };

            let interactions = resource.interaction_codes();
            if !interactions.iter().any(|code| code == SEARCH_TYPE) {
                tracing::debug!(resource_type = %resource_type, "Skipping resource without search-type");
                continue;
            }

            if resource_metadata.contains_key(&resource_type) {
                tracing::warn!(resource_type = %resource_type, "Duplicate resource entry in CapabilityStatement, keeping the first");
                continue;
            }

            let metadata =
                ResourceMetadata::from_capability(resource, resource_type.clone(), interactions);
            resource_metadata.insert(resource_type, metadata);
        }

        Ok(Self {
            resource_metadata,
            fhir_version: statement.fhir_version,
            server_url: server_url.into(),
        })
    }

    /// Searchable resource types in discovery order
    pub fn searchable_types(&self) -> impl ExactSizeIterator<Item = &str> {
        self.resource_metadata.keys().map(String::as_str)
    }

    /// Searchable resource types in lexical order
    pub fn sorted_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.searchable_types().collect();
        types.sort_unstable();
        types
    }

    pub fn resource_metadata(&self) -> &IndexMap<String, ResourceMetadata> {
        &self.resource_metadata
    }

    pub fn resource(&self, resource_type: &str) -> Option<&ResourceMetadata> {
        self.resource_metadata.get(resource_type)
    }

    /// Like [`Self::resource`], but a missing type is a `NotFound` error.
    pub fn require(&self, resource_type: &str) -> Result<&ResourceMetadata> {
        self.resource(resource_type)
            .ok_or_else(|| self.not_found(resource_type))
    }

    pub fn contains_type(&self, resource_type: &str) -> bool {
        self.resource_metadata.contains_key(resource_type)
    }

    pub fn len(&self) -> usize {
        self.resource_metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_metadata.is_empty()
    }

    pub fn fhir_version(&self) -> Option<&str> {
        self.fhir_version.as_deref()
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Search parameters advertised for one type, sorted by name.
    pub fn search_parameters(&self, resource_type: &str) -> Result<&[SearchParameter]> {
        self.require(resource_type)
            .map(|metadata| metadata.search_params.as_slice())
    }

    /// Full search URL: `{server_url}/{resource_type}?{query_string}`
    pub fn search_url(&self, resource_type: &str, query_string: &str) -> String {
        format!("{}/{}?{}", self.server_url, resource_type, query_string)
    }

    fn not_found(&self, resource_type: &str) -> FhirQueryError {
        FhirQueryError::NotFound {
            resource_type: resource_type.to_string(),
            alternatives: self
                .sorted_types()
                .into_iter()
                .take(MAX_ALTERNATIVES)
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Search parameters for `resource_type`, or `NotFound` with up to ten
/// alternative type names.
pub fn get_search_parameters<'a>(
    resource_type: &str,
    metadata: &'a FhirMetadata,
) -> Result<&'a [SearchParameter]> {
    metadata.search_parameters(resource_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(resource_type: &str, interactions: &[&str], params: JsonValue) -> JsonValue {
        json!({
            "type": resource_type,
            "interaction": interactions.iter().map(|c| json!({"code": c})).collect::<Vec<_>>(),
            "searchParam": params,
        })
    }

    fn statement(resources: Vec<JsonValue>) -> JsonValue {
        json!({
            "resourceType": "CapabilityStatement",
            "fhirVersion": "4.0.1",
            "rest": [{"mode": "server", "resource": resources}]
        })
    }

    #[test]
    fn keeps_only_search_type_resources() {
        let value = statement(vec![
            resource("Patient", &["read", "search-type"], json!([])),
            resource("Binary", &["read", "create"], json!([])),
            resource("Observation", &["search-type"], json!([])),
        ]);
        let metadata = FhirMetadata::from_json(value, "http://fhir.test").unwrap();

        assert_eq!(
            metadata.searchable_types().collect::<Vec<_>>(),
            vec!["Patient", "Observation"]
        );
        assert!(!metadata.contains_type("Binary"));
        assert_eq!(metadata.fhir_version(), Some("4.0.1"));
        assert_eq!(metadata.server_url(), "http://fhir.test");
    }

    #[test]
    fn sorts_parameters_and_includes() {
        let mut patient = resource(
            "Patient",
            &["search-type"],
            json!([
                {"name": "name", "type": "string", "documentation": "A portion of the name"},
                {"name": "birthdate", "type": "date"},
                {"name": "_id", "type": "token"},
                {"name": "address-city"}
            ]),
        );
        patient["searchInclude"] = json!(["Patient:organization", "Patient:general-practitioner"]);
        patient["searchRevInclude"] = json!(["Provenance:target", "Encounter:subject"]);

        let metadata = FhirMetadata::from_json(statement(vec![patient]), "http://fhir.test").unwrap();
        let patient = metadata.resource("Patient").unwrap();

        let names: Vec<&str> = patient.search_params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["_id", "address-city", "birthdate", "name"]);
        assert_eq!(patient.search_params[1].kind, None);
        assert_eq!(patient.search_params[2].kind, Some(SearchParamType::Date));
        assert_eq!(
            patient.include_values,
            vec!["Patient:general-practitioner", "Patient:organization"]
        );
        assert_eq!(patient.revinclude_values, vec!["Encounter:subject", "Provenance:target"]);
    }

    #[test]
    fn unknown_type_codes_are_unset() {
        let value = statement(vec![resource(
            "Patient",
            &["search-type"],
            json!([{"name": "link", "type": "resource"}]),
        )]);
        let metadata = FhirMetadata::from_json(value, "http://fhir.test").unwrap();
        assert_eq!(metadata.resource("Patient").unwrap().search_params[0].kind, None);
    }

    #[test]
    fn keeps_searchable_type_without_parameters() {
        let value = statement(vec![json!({
            "type": "Basic",
            "interaction": [{"code": "search-type"}]
        })]);
        let metadata = FhirMetadata::from_json(value, "http://fhir.test").unwrap();
        let basic = metadata.resource("Basic").unwrap();
        assert!(basic.search_params.is_empty());
        assert!(basic.include_values.is_empty());
        assert!(basic.supports(SEARCH_TYPE));
    }

    #[test]
    fn skips_untyped_entries_and_unnamed_parameters() {
        let value = statement(vec![
            json!({"interaction": [{"code": "search-type"}]}),
            resource(
                "Encounter",
                &["search-type"],
                json!([{"type": "token"}, {"name": "status", "type": "token"}]),
            ),
        ]);
        let metadata = FhirMetadata::from_json(value, "http://fhir.test").unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.resource("Encounter").unwrap().search_params.len(), 1);
    }

    #[test]
    fn duplicate_parameters_survive_normalization() {
        let value = statement(vec![resource(
            "Patient",
            &["search-type"],
            json!([{"name": "name", "type": "string"}, {"name": "name", "type": "string"}]),
        )]);
        let metadata = FhirMetadata::from_json(value, "http://fhir.test").unwrap();
        assert_eq!(metadata.resource("Patient").unwrap().search_params.len(), 2);
    }

    #[test]
    fn first_duplicate_resource_entry_wins() {
        let value = statement(vec![
            resource("Patient", &["search-type"], json!([{"name": "name"}])),
            resource("Patient", &["search-type"], json!([])),
        ]);
        let metadata = FhirMetadata::from_json(value, "http://fhir.test").unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.resource("Patient").unwrap().search_params.len(), 1);
    }

    #[test]
    fn uses_server_mode_entry() {
        let value = json!({
            "rest": [
                {"mode": "client", "resource": [resource("Patient", &["search-type"], json!([]))]},
                {"mode": "server", "resource": [resource("Observation", &["search-type"], json!([]))]}
            ]
        });
        let metadata = FhirMetadata::from_json(value, "http://fhir.test").unwrap();
        assert_eq!(metadata.searchable_types().collect::<Vec<_>>(), vec!["Observation"]);
        assert_eq!(metadata.fhir_version(), None);
    }

    #[test]
    fn schema_errors() {
        let cases = [
            (json!({"resourceType": "CapabilityStatement"}), "missing 'rest'"),
            (json!({"rest": []}), "missing 'rest'"),
            (json!({"rest": [{"mode": "client", "resource": []}]}), "mode 'server'"),
            (json!({"rest": [{"mode": "server"}]}), "missing 'resource'"),
            (json!({"rest": "server"}), "invalid type"),
            (json!(["not", "an", "object"]), "JSON object"),
        ];

        for (value, expected) in cases {
            match FhirMetadata::from_json(value.clone(), "http://fhir.test") {
                Err(FhirQueryError::Schema(msg)) => {
                    assert!(msg.contains(expected), "{value}: unexpected message {msg}")
                }
                other => panic!("{value}: expected schema error, got {other:?}"),
            }
        }
    }

    #[test]
    fn not_found_lists_ten_sorted_alternatives() {
        let types = [
            "Patient", "Observation", "Encounter", "Condition", "Procedure", "Medication",
            "MedicationRequest", "AllergyIntolerance", "Immunization", "DiagnosticReport",
            "CarePlan", "Device",
        ];
        let resources = types
            .iter()
            .map(|t| resource(t, &["search-type"], json!([])))
            .collect();
        let metadata = FhirMetadata::from_json(statement(resources), "http://fhir.test").unwrap();

        match get_search_parameters("TypeNotPresent", &metadata) {
            Err(FhirQueryError::NotFound { resource_type, alternatives }) => {
                assert_eq!(resource_type, "TypeNotPresent");
                assert_eq!(alternatives.len(), 10);
                let mut sorted = alternatives.clone();
                sorted.sort();
                assert_eq!(alternatives, sorted);
                assert_eq!(alternatives[0], "AllergyIntolerance");
                assert!(!alternatives.contains(&"Procedure".to_string()));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn search_parameters_for_known_type() {
        let value = statement(vec![resource(
            "Patient",
            &["search-type"],
            json!([{"name": "gender", "type": "token"}]),
        )]);
        let metadata = FhirMetadata::from_json(value, "http://fhir.test").unwrap();
        let params = get_search_parameters("Patient", &metadata).unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "gender");
    }

    #[test]
    fn search_url_joins_server_type_and_query() {
        let value = statement(vec![resource("Patient", &["search-type"], json!([]))]);
        let metadata = FhirMetadata::from_json(value, "https://r4.smarthealthit.org").unwrap();
        assert_eq!(
            metadata.search_url("Patient", "birthdate=gt1990-01-01"),
            "https://r4.smarthealthit.org/Patient?birthdate=gt1990-01-01"
        );
    }

    #[test]
    fn parameter_display() {
        let documented = SearchParameter::new(
            "birthdate",
            Some(SearchParamType::Date),
            Some("The patient's date of birth"),
        );
        assert_eq!(documented.to_string(), "birthdate (date): The patient's date of birth");
        assert_eq!(SearchParameter::new("link", None, None).to_string(), "link (special)");
    }
}
