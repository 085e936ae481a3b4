//! Desired-state document published by the control plane.
//!
//! Every field is optional on the wire; missing values deserialize to their
//! defaults so a partial signal still parses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{ConfigFile, EnvVar};

/// Version marker meaning "resolve the newest published release".
pub const LATEST: &str = "latest";

/// Vendor name used in `remove_other_vendors`.
pub const VENDOR_DATADOG: &str = "datadog";

/// Wildcard entry in `remove_other_vendors`, matching every vendor.
pub const VENDOR_ALL: &str = "all";

/// Whether a `remove_other_vendors` list names `vendor`, directly or through
/// the `all` wildcard.
#[must_use]
pub fn lists_vendor(vendors: &[String], vendor: &str) -> bool {
    vendors.iter().any(|v| v == vendor || v == VENDOR_ALL)
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("invalid signal document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Top-level `{"signal": {...}}` wrapper returned by the state endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(default)]
    pub signal: SignalSpec,
}

impl SignalEnvelope {
    /// Parse raw signal bytes as fetched from the control plane.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignalError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Kind of signal. Unknown values are kept as `Unknown` rather than rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Update,
    Uninstall,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSpec {
    #[serde(rename = "type")]
    pub type_signal: SignalType,
    pub agents: Agents,
    pub duration: String,
    pub remove_other_vendors: Vec<String>,
}

impl SignalSpec {
    /// Whether `vendor` is listed for removal.
    #[must_use]
    pub fn removes_vendor(&self, vendor: &str) -> bool {
        lists_vendor(&self.remove_other_vendors, vendor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Agents {
    #[serde(rename = "docp-agent")]
    pub docp_agent: CoreAgentSpec,
    #[serde(rename = "datadog-agent")]
    pub datadog_agent: VendorAgentSpec,
    #[serde(rename = "datadog-tracer-library")]
    pub datadog_tracer_library: TracerLibrarySpec,
    #[serde(rename = "datadog-tracer-single-step")]
    pub datadog_tracer_single_step: TracerSingleStepSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreAgentSpec {
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorAgentSpec {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(rename = "api-key")]
    pub api_key: String,
    #[serde(rename = "app-key")]
    pub app_key: String,
    pub site: String,
    pub configurations: VendorConfigurations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfigurations {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ConfigFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerLibrarySpec {
    pub version: String,
    pub language: String,
    pub path_tracer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerSingleStepSpec {
    pub version: String,
    pub install_with_env_vars: Vec<EnvVar>,
}
