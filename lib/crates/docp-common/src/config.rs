use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Agent state file (`config.yml`) shared by the agent, updater and manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub version: String,
    pub rollback_version: String,
    #[serde(skip_serializing_if = "is_false")]
    pub already_created: bool,
    pub already_tracer: bool,
    pub tracer_languages: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub no_group_association: bool,
    pub agent: AgentCredentials,
    pub access_token: String,
    pub compute_id: String,
    pub docp_org_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCredentials {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub tags: BTreeMap<String, serde_json::Value>,
}

impl AgentConfig {
    #[must_use]
    pub fn has_tracer_language(&self, language: &str) -> bool {
        self.tracer_languages.iter().any(|l| l == language)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}
