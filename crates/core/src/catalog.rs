//! FHIR-wide search parameters and the per-type search universe.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::Result;
use crate::metadata::{FhirMetadata, SearchParamType, SearchParameter};
use crate::query::CreateQueryError;

use crate::metadata::SearchParamType::{Date, Number, Reference, Special, String as Str, Token, Uri};

/// Parameters every resource type accepts, whether or not the server lists them.
const COMMON_PARAMS: &[(&str, SearchParamType, &str)] = &[
    ("_id", Token, "Logical id of the resource, e.g. _id=123"),
    ("_lastUpdated", Date, "When the resource last changed, e.g. _lastUpdated=gt2023-01-01"),
    ("_tag", Token, "Tags in Resource.meta.tag"),
    ("_profile", Reference, "Profiles the resource claims to conform to (Resource.meta.profile)"),
    ("_security", Token, "Security labels in Resource.meta.security"),
    ("_source", Uri, "Source system recorded in Resource.meta.source"),
    ("_language", Token, "Language of the resource content"),
    ("_text", Str, "Search the narrative text of the resource"),
    ("_content", Str, "Search the entire content of the resource"),
    ("_list", Special, "Resources referenced by a List resource, e.g. _list=42"),
    (
        "_has",
        Special,
        "Reverse chaining on resources that refer to this one. \
         _has:Observation:patient:code=1234-5 finds patients with an Observation of code 1234-5; \
         _has:MedicationRequest:requester:_id=* finds practitioners who authored any MedicationRequest",
    ),
    ("_type", Special, "Restrict by resource type (system-level searches)"),
    ("_in", Reference, "Membership in a CareTeam, Group or List"),
    ("_filter", Special, "Filter expression in the FHIR _filter syntax"),
    ("_query", Special, "Invoke a named custom query"),
    ("_sort", Str, "Comma-separated sort rules, '-' prefix for descending, e.g. _sort=-date,status"),
    ("_count", Number, "Page size, e.g. _count=10"),
    (
        "_include",
        Special,
        "Include referenced resources: _include=[Resource]:[searchParam] or \
         [Resource]:[searchParam]:[targetType] or *, e.g. _include=Observation:patient",
    ),
    (
        "_revinclude",
        Special,
        "Include resources referring to the matches: _revinclude=[Resource]:[searchParam] or \
         [Resource]:[searchParam]:[targetType] or *, e.g. _revinclude=Provenance:target",
    ),
    ("_summary", Token, "Summary view: true, false, text, count, data"),
    ("_elements", Str, "Comma-separated elements to return, e.g. _elements=identifier,name,birthDate"),
    ("_contained", Token, "Contained resource handling: true, false, both"),
    ("_containedType", Token, "What to return for contained matches: container, contained"),
    ("_total", Token, "Total count precision: none, estimate, accurate"),
    ("_maxresults", Number, "Maximum results across all pages"),
    ("_score", Token, "Include relevance scores: true, false"),
    ("_graph", Reference, "GraphDefinition describing structured includes"),
];

/// Number of names quoted in a query-error suggestion.
const MAX_SUGGESTIONS: usize = 10;

/// The common search parameters, in catalog order.
pub fn common_search_params() -> Vec<SearchParameter> {
    COMMON_PARAMS
        .iter()
        .map(|(name, kind, doc)| SearchParameter::new(*name, Some(*kind), Some(doc)))
        .collect()
}

/// Merge type-specific and common parameters into one name-unique list
/// sorted by name. Type-specific entries win on collisions.
pub fn merge_search_params(
    type_specific: &[SearchParameter],
    common: &[SearchParameter],
) -> Vec<SearchParameter> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged: Vec<SearchParameter> = type_specific
        .iter()
        .chain(common)
        .filter(|param| seen.insert(param.name.as_str()))
        .cloned()
        .collect();
    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}

fn sorted_copy(values: &[String]) -> Vec<String> {
    let mut values = values.to_vec();
    values.sort();
    values.dedup();
    values
}

/// Base parameter name of a query key: `subject:Patient.name` -> `subject`
fn base_name(key: &str) -> &str {
    key.split([':', '.']).next().unwrap_or(key)
}

/// Every token a synthesized query for one resource type may use.
///
/// Built from copies: the [`FhirMetadata`] it came from is left untouched.
#[derive(Debug, Clone, Serialize)]
pub struct SearchUniverse {
    resource_type: String,
    parameters: Vec<SearchParameter>,
    include_values: Vec<String>,
    revinclude_values: Vec<String>,
}

/// A query token outside the universe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniverseViolation {
    /// Not a `name=value` pair, or one side is empty
    Malformed { pair: String },
    UnknownParameter { name: String },
    UnknownInclude { directive: String, value: String },
}

impl SearchUniverse {
    /// Fails with `NotFound` if `resource_type` is not searchable on the server.
    pub fn new(
        resource_type: &str,
        metadata: &FhirMetadata,
        common: &[SearchParameter],
    ) -> Result<Self> {
        let resource = metadata.require(resource_type)?;
        Ok(Self {
            resource_type: resource.resource_type.clone(),
            parameters: merge_search_params(&resource.search_params, common),
            include_values: sorted_copy(&resource.include_values),
            revinclude_values: sorted_copy(&resource.revinclude_values),
        })
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn parameters(&self) -> &[SearchParameter] {
        &self.parameters
    }

    pub fn include_values(&self) -> &[String] {
        &self.include_values
    }

    pub fn revinclude_values(&self) -> &[String] {
        &self.revinclude_values
    }

    pub fn parameter(&self, name: &str) -> Option<&SearchParameter> {
        self.parameters
            .binary_search_by(|p| p.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.parameters[idx])
    }

    /// Check that every parameter key and `_include`/`_revinclude` value in
    /// `query_string` belongs to this universe.
    pub fn check(&self, query_string: &str) -> std::result::Result<(), UniverseViolation> {
        for pair in query_string.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() && !value.is_empty() => (key, value),
                _ => {
                    return Err(UniverseViolation::Malformed {
                        pair: pair.to_string(),
                    });
                }
            };
            let Some(base) = self.resolve(key) else {
                return Err(UniverseViolation::UnknownParameter {
                    name: key.to_string(),
                });
            };

            let allowed = match base {
                "_include" => &self.include_values,
                "_revinclude" => &self.revinclude_values,
                _ => continue,
            };
            for target in value.split(',').filter(|v| !v.is_empty()) {
                if !Self::include_allowed(allowed, target) {
                    return Err(UniverseViolation::UnknownInclude {
                        directive: base.to_string(),
                        value: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The parameter a query key refers to: the longest prefix of `key` that
    /// ends at a `:` or `.` boundary (or is all of it) and names a listed
    /// parameter. `subject:Patient.name` resolves to `subject`, while
    /// `patient.name:exact` resolves to `patient.name` if that is listed.
    fn resolve<'k>(&self, key: &'k str) -> Option<&'k str> {
        let mut ends: Vec<usize> = key.match_indices([':', '.']).map(|(idx, _)| idx).collect();
        ends.push(key.len());
        ends.into_iter()
            .rev()
            .map(|end| &key[..end])
            .find(|candidate| self.parameter(candidate).is_some())
    }

    /// `*`, an exact listed value, or a listed value narrowed by a target type
    /// (`Observation:subject:Patient` when `Observation:subject` is listed).
    fn include_allowed(allowed: &[String], target: &str) -> bool {
        if target == "*" || allowed.iter().any(|v| v == target) {
            return true;
        }
        let mut segments = target.rsplitn(2, ':');
        match (segments.next(), segments.next()) {
            (Some(_), Some(prefix)) if prefix.contains(':') => {
                allowed.iter().any(|v| v == prefix)
            }
            _ => false,
        }
    }

    /// Turn a violation into the structured error surfaced to the caller.
    pub fn violation_error(&self, violation: &UniverseViolation) -> CreateQueryError {
        match violation {
            UniverseViolation::Malformed { pair } => CreateQueryError {
                error: format!("'{}' is not a name=value search criterion", pair),
                suggestion: Some(format!(
                    "Write each criterion as name=value using one of: {}",
                    self.similar_parameters(base_name(pair.split('=').next().unwrap_or(pair)))
                        .join(", ")
                )),
            },
            UniverseViolation::UnknownParameter { name } => CreateQueryError {
                error: format!(
                    "Search parameter '{}' is not available for {}",
                    name, self.resource_type
                ),
                suggestion: Some(format!(
                    "Use one of the available parameters, e.g. {}",
                    self.similar_parameters(base_name(name)).join(", ")
                )),
            },
            UniverseViolation::UnknownInclude { directive, value } => {
                let allowed = if directive == "_include" {
                    &self.include_values
                } else {
                    &self.revinclude_values
                };
                CreateQueryError {
                    error: format!(
                        "{}={} is not supported for {}",
                        directive, value, self.resource_type
                    ),
                    suggestion: Some(if allowed.is_empty() {
                        format!("The server lists no {} values for {}", directive, self.resource_type)
                    } else {
                        format!(
                            "Supported {} values: {}",
                            directive,
                            allowed.iter().take(MAX_SUGGESTIONS).cloned().collect::<Vec<_>>().join(", ")
                        )
                    }),
                }
            }
        }
    }

    /// Parameter names resembling `name`, falling back to the type's own
    /// (non-underscore) parameters.
    fn similar_parameters(&self, name: &str) -> Vec<&str> {
        let needle = name.trim_start_matches('_').to_lowercase();
        let mut similar: Vec<&str> = if needle.is_empty() {
            Vec::new()
        } else {
            self.parameters
                .iter()
                .map(|p| p.name.as_str())
                .filter(|candidate| {
                    let candidate = candidate.to_lowercase();
                    candidate.contains(&needle) || needle.contains(candidate.trim_start_matches('_'))
                })
                .take(MAX_SUGGESTIONS)
                .collect()
        };

        if similar.is_empty() {
            similar = self
                .parameters
                .iter()
                .map(|p| p.name.as_str())
                .filter(|n| !n.starts_with('_'))
                .take(MAX_SUGGESTIONS)
                .collect();
        }
        similar
    }
}
