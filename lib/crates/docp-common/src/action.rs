//! Dispatchable units of work derived from a signal.
//!
//! The JSON form of an [`Action`] is also its fingerprint input, so field
//! order and the empty-list omission rules below are part of the contract.

use serde::{Deserialize, Serialize};

/// Which lane an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "docp-agent")]
    CoreAgent,
    #[serde(rename = "datadog")]
    Vendor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Install,
    Update,
    Uninstall,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "single_step")]
    SingleStep,
    #[serde(rename = "tracing_library")]
    TracingLibrary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "agent")]
    Agent,
    #[serde(rename = "tracer")]
    Tracer,
}

/// A `name=value` pair carried by an action or a signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A vendor configuration file to write on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub action: ActionKind,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub component: Component,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_envs: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ConfigFile>,
}

impl Action {
    /// Bare action with no mode, component or payload.
    #[must_use]
    pub fn new(action_type: ActionType, action: ActionKind) -> Self {
        Self {
            action_type,
            action,
            mode: Mode::None,
            version: String::new(),
            component: Component::None,
            component_envs: Vec::new(),
            envs: Vec::new(),
            files: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.component = component;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// First env value named `name`, looked up in `envs`.
    #[must_use]
    pub fn env(&self, name: &str) -> Option<&str> {
        lookup(&self.envs, name)
    }

    /// First env value named `name`, looked up in `component_envs`.
    #[must_use]
    pub fn component_env(&self, name: &str) -> Option<&str> {
        lookup(&self.component_envs, name)
    }

    /// Vendor action targeting the agent component.
    #[must_use]
    pub fn is_vendor_agent(&self) -> bool {
        self.action_type == ActionType::Vendor && self.component == Component::Agent
    }

    /// Vendor tracer install in single-step mode.
    #[must_use]
    pub fn is_single_step_tracer(&self) -> bool {
        self.action_type == ActionType::Vendor
            && self.component == Component::Tracer
            && self.mode == Mode::SingleStep
    }
}

fn lookup<'a>(vars: &'a [EnvVar], name: &str) -> Option<&'a str> {
    vars.iter()
        .find(|v| v.name == name)
        .map(|v| v.value.as_str())
}
