//! Candidate actions built from a signal, plus the env extraction the lanes
//! need to act on them.
//!
//! Pure functions only: no I/O, no async, no cache access.

use docp_common::action::{Action, ActionKind, ActionType, Component, EnvVar, Mode};
use docp_common::signal::{SignalSpec, SignalType, VENDOR_DATADOG, VendorAgentSpec};

use crate::domain::error::ActionError;

// ── Cache keys ────────────────────────────────────────────────────────────────

pub const KEY_CORE_AGENT: &str = "action.docp.state";
pub const KEY_VENDOR_AGENT: &str = "action.datadog.state";
pub const KEY_VENDOR_UPDATE: &str = "action.datadog.update";
pub const KEY_TRACER_LIBRARY: &str = "action.datadog.tracer.library";
pub const KEY_TRACER_SINGLE_STEP: &str = "action.datadog.tracer.single.step";

// ── Env names ─────────────────────────────────────────────────────────────────

pub const DD_API_KEY: &str = "DD_API_KEY";
pub const DD_APP_KEY: &str = "DD_APP_KEY";
pub const DD_SITE: &str = "DD_SITE";
pub const DD_ENV: &str = "DD_ENV";
pub const DD_APM_INSTRUMENTATION_ENABLED: &str = "DD_APM_INSTRUMENTATION_ENABLED";
pub const DD_APM_INSTRUMENTATION_LIBRARIES: &str = "DD_APM_INSTRUMENTATION_LIBRARIES";

pub const TRACER_LANGUAGE: &str = "language";
pub const TRACER_PATH: &str = "path_tracer";
pub const TRACER_VERSION: &str = "version";

/// Site used when the configured one has no parsable host.
pub const DEFAULT_VENDOR_SITE: &str = "datadoghq.com";

// ── Candidates ────────────────────────────────────────────────────────────────

/// Core agent update or uninstall. Requires a core agent version.
#[must_use]
pub fn core_agent_action(signal: &SignalSpec) -> Option<Action> {
    let version = &signal.agents.docp_agent.version;
    if version.is_empty() {
        return None;
    }
    match signal.type_signal {
        SignalType::Update => {
            Some(Action::new(ActionType::CoreAgent, ActionKind::Update).with_version(version))
        }
        SignalType::Uninstall => Some(Action::new(ActionType::CoreAgent, ActionKind::Uninstall)),
        SignalType::Unknown => None,
    }
}

/// Vendor agent install (update signal) or uninstall (vendor listed for removal).
#[must_use]
pub fn vendor_agent_action(signal: &SignalSpec) -> Option<Action> {
    let vendor = &signal.agents.datadog_agent;
    match signal.type_signal {
        SignalType::Update if !vendor.version.is_empty() => {
            let mut action = Action::new(ActionType::Vendor, ActionKind::Install)
                .with_component(Component::Agent);
            action.envs = vendor_credentials(vendor);
            action.files.clone_from(&vendor.configurations.files);
            Some(action)
        }
        SignalType::Uninstall if signal.removes_vendor(VENDOR_DATADOG) => Some(
            Action::new(ActionType::Vendor, ActionKind::Uninstall).with_component(Component::Agent),
        ),
        _ => None,
    }
}

/// Vendor agent update carrying the target version and configuration files.
#[must_use]
pub fn vendor_update_action(signal: &SignalSpec) -> Option<Action> {
    let vendor = &signal.agents.datadog_agent;
    if signal.type_signal != SignalType::Update || vendor.version.is_empty() {
        return None;
    }
    let mut action = Action::new(ActionType::Vendor, ActionKind::Update)
        .with_component(Component::Agent)
        .with_version(&vendor.version);
    action.files.clone_from(&vendor.configurations.files);
    Some(action)
}

/// Tracer install in tracing-library mode. Excluded when single step is requested.
#[must_use]
pub fn tracer_library_action(signal: &SignalSpec) -> Option<Action> {
    let library = &signal.agents.datadog_tracer_library;
    let single_step = &signal.agents.datadog_tracer_single_step;
    if signal.type_signal != SignalType::Update
        || library.version.is_empty()
        || !single_step.version.is_empty()
    {
        return None;
    }
    let mut action = tracer_action(signal, Mode::TracingLibrary);
    action.component_envs = vec![
        EnvVar::new(TRACER_LANGUAGE, &library.language),
        EnvVar::new(TRACER_PATH, &library.path_tracer),
        EnvVar::new(TRACER_VERSION, &library.version),
    ];
    Some(action)
}

/// Tracer install in single-step mode. Excluded when a tracing library is requested.
#[must_use]
pub fn tracer_single_step_action(signal: &SignalSpec) -> Option<Action> {
    let library = &signal.agents.datadog_tracer_library;
    let single_step = &signal.agents.datadog_tracer_single_step;
    if signal.type_signal != SignalType::Update
        || single_step.version.is_empty()
        || !library.version.is_empty()
    {
        return None;
    }
    let mut action = tracer_action(signal, Mode::SingleStep);
    action
        .component_envs
        .clone_from(&single_step.install_with_env_vars);
    Some(action)
}

fn tracer_action(signal: &SignalSpec, mode: Mode) -> Action {
    let vendor = &signal.agents.datadog_agent;
    let mut action = Action::new(ActionType::Vendor, ActionKind::Install)
        .with_component(Component::Tracer)
        .with_mode(mode);
    if !vendor.version.is_empty() {
        action.envs = vendor_credentials(vendor);
        action.files.clone_from(&vendor.configurations.files);
    }
    action
}

fn vendor_credentials(vendor: &VendorAgentSpec) -> Vec<EnvVar> {
    vec![
        EnvVar::new(DD_API_KEY, &vendor.api_key),
        EnvVar::new(DD_APP_KEY, &vendor.app_key),
        EnvVar::new(DD_SITE, vendor_site(&vendor.site)),
    ]
}

/// Drop every vendor agent action when a single-step tracer install is present.
#[must_use]
pub fn drop_agent_when_single_step(actions: Vec<Action>) -> Vec<Action> {
    let has_agent = actions.iter().any(Action::is_vendor_agent);
    let has_single_step = actions.iter().any(Action::is_single_step_tracer);
    if !(has_agent && has_single_step) {
        return actions;
    }
    actions
        .into_iter()
        .filter(|a| !a.is_vendor_agent())
        .collect()
}

/// Registrable base of a site URL: host with only its last two labels.
///
/// `https://app.datadoghq.eu/path` becomes `datadoghq.eu`. The scheme is
/// optional. Input without any host falls back to [`DEFAULT_VENDOR_SITE`].
#[must_use]
pub fn vendor_site(site: &str) -> String {
    let rest = site.trim();
    let rest = rest.split_once("://").map_or(rest, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host_port.split(':').next().unwrap_or_default();

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.is_empty() {
        return DEFAULT_VENDOR_SITE.to_string();
    }
    labels[labels.len().saturating_sub(2)..].join(".")
}

// ── Env extraction ────────────────────────────────────────────────────────────

/// Credentials needed to install the vendor agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInstallEnv {
    pub api_key: String,
    pub site: String,
}

/// Parameters of a single-step tracer install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleStepEnv {
    pub api_key: String,
    pub site: String,
    pub instrumentation_enabled: String,
    pub env: String,
    pub instrumentation_libraries: String,
}

/// Parameters of a tracing-library install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingLibraryEnv {
    pub language: String,
    pub path_tracer: String,
    pub version: String,
}

/// # Errors
///
/// Returns [`ActionError::MissingEnv`] when the API key or site is absent.
pub fn agent_install_env(action: &Action) -> Result<AgentInstallEnv, ActionError> {
    Ok(AgentInstallEnv {
        api_key: required(action.env(DD_API_KEY), DD_API_KEY)?,
        site: required(action.env(DD_SITE), DD_SITE)?,
    })
}

/// # Errors
///
/// Returns [`ActionError::MissingEnv`] when instrumentation is not enabled
/// explicitly or no instrumentation libraries are listed.
pub fn single_step_env(action: &Action) -> Result<SingleStepEnv, ActionError> {
    Ok(SingleStepEnv {
        api_key: action.env(DD_API_KEY).unwrap_or_default().to_string(),
        site: action.env(DD_SITE).unwrap_or_default().to_string(),
        instrumentation_enabled: required(
            action.component_env(DD_APM_INSTRUMENTATION_ENABLED),
            DD_APM_INSTRUMENTATION_ENABLED,
        )?,
        env: action.component_env(DD_ENV).unwrap_or_default().to_string(),
        instrumentation_libraries: required(
            action.component_env(DD_APM_INSTRUMENTATION_LIBRARIES),
            DD_APM_INSTRUMENTATION_LIBRARIES,
        )?,
    })
}

/// # Errors
///
/// Returns [`ActionError::MissingEnv`] when no language is given.
pub fn tracing_library_env(action: &Action) -> Result<TracingLibraryEnv, ActionError> {
    Ok(TracingLibraryEnv {
        language: required(action.component_env(TRACER_LANGUAGE), TRACER_LANGUAGE)?,
        path_tracer: action
            .component_env(TRACER_PATH)
            .unwrap_or_default()
            .to_string(),
        version: action
            .component_env(TRACER_VERSION)
            .unwrap_or_default()
            .to_string(),
    })
}

fn required(value: Option<&str>, name: &'static str) -> Result<String, ActionError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ActionError::MissingEnv(name)),
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
