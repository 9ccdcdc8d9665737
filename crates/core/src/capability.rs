use serde::{Deserialize, Serialize};

/// FHIR CapabilityStatement as served by `GET [base]/metadata` (the parts the
/// query builder reads). Every field is optional so partially populated
/// statements still deserialize; structural checks happen in
/// [`crate::FhirMetadata::from_capability_statement`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<Vec<CapabilityRest>>,
}

/// REST capability declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityRest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Vec<CapabilityResource>>,
}

impl CapabilityRest {
    pub fn is_server(&self) -> bool {
        self.mode.as_deref() == Some("server")
    }
}

/// Per-resource capability entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityResource {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default)]
    pub interaction: Vec<CapabilityInteraction>,
    #[serde(default)]
    pub search_param: Vec<CapabilitySearchParam>,
    #[serde(default)]
    pub search_include: Vec<String>,
    #[serde(default)]
    pub search_rev_include: Vec<String>,
}

impl CapabilityResource {
    /// Interaction codes in declaration order, entries without a code dropped.
    pub fn interaction_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::with_capacity(self.interaction.len());
        for code in self.interaction.iter().filter_map(|i| i.code.as_deref()) {
            if !codes.iter().any(|c| c == code) {
                codes.push(code.to_string());
            }
        }
        codes
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityInteraction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitySearchParam {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}
