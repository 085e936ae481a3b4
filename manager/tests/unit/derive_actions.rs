//! Action derivation against realistic signals.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use docp_common::action::{Action, ActionKind, ActionType, Component, Mode};
use docp_common::signal::{SignalEnvelope, SignalSpec};
use docp_manager::application::hash_cache::HashCache;
use docp_manager::application::services::derive::ActionDeriver;
use docp_manager::domain::actions::{DD_API_KEY, DD_SITE, KEY_VENDOR_UPDATE};
use proptest::prelude::*;

fn signal(json: &str) -> SignalSpec {
    SignalEnvelope::from_slice(json.as_bytes())
        .expect("valid signal")
        .signal
}

fn fresh() -> (ActionDeriver, Arc<HashCache>) {
    let cache = Arc::new(HashCache::new());
    (ActionDeriver::new(Arc::clone(&cache)), cache)
}

fn vendor_signal(file_content: &str) -> SignalSpec {
    signal(&format!(
        r#"{{"signal":{{"type":"update","agents":{{"datadog-agent":{{
            "version":"7.52.0","api-key":"k","app-key":"a","site":"https://app.datadoghq.eu",
            "configurations":{{"files":[{{"file_path":"/etc/datadog-agent/datadog.yaml","content":"{file_content}"}}]}}
        }}}}}}}}"#
    ))
}

// ── End-to-end scenarios ──────────────────────────────────────────────────────

#[test]
fn test_update_signal_emits_core_update_then_nothing() {
    let (deriver, _) = fresh();
    let s = signal(r#"{"signal":{"type":"update","agents":{"docp-agent":{"version":"1.2.0"}}}}"#);

    assert_eq!(
        deriver.derive(&s, false).unwrap(),
        vec![Action::new(ActionType::CoreAgent, ActionKind::Update).with_version("1.2.0")]
    );
    assert_eq!(deriver.derive(&s, false).unwrap(), vec![]);
}

#[test]
fn test_uninstall_signal_removes_vendor_only() {
    let (deriver, _) = fresh();
    let s = signal(r#"{"signal":{"type":"uninstall","remove_other_vendors":["datadog"]}}"#);

    assert_eq!(
        deriver.derive(&s, true).unwrap(),
        vec![Action::new(ActionType::Vendor, ActionKind::Uninstall).with_component(Component::Agent)]
    );
}

#[test]
fn test_vendor_install_carries_credentials_and_site_base() {
    let (deriver, _) = fresh();
    let actions = deriver.derive(&vendor_signal("a"), false).unwrap();

    assert_eq!(actions.len(), 1);
    let install = &actions[0];
    assert_eq!(install.action, ActionKind::Install);
    assert_eq!(install.component, Component::Agent);
    assert_eq!(install.env(DD_API_KEY), Some("k"));
    assert_eq!(install.env(DD_SITE), Some("datadoghq.eu"));
    assert_eq!(install.files.len(), 1);
}

#[test]
fn test_install_state_change_re_emits_vendor_install() {
    let (deriver, _) = fresh();
    let s = vendor_signal("a");

    assert_eq!(deriver.derive(&s, false).unwrap().len(), 1);
    assert!(deriver.derive(&s, false).unwrap().is_empty());

    // The agent was removed out of band: same signal, different install state.
    let after_install = deriver.derive(&s, true).unwrap();
    let kinds: Vec<ActionKind> = after_install.iter().map(|a| a.action).collect();
    assert_eq!(kinds, vec![ActionKind::Install, ActionKind::Update]);
}

#[test]
fn test_vendor_update_not_recorded_until_installed() {
    let (deriver, cache) = fresh();
    let s = vendor_signal("a");

    deriver.derive(&s, false).unwrap();
    assert!(cache.get(KEY_VENDOR_UPDATE).is_none());

    let actions = deriver.derive(&s, true).unwrap();
    assert!(actions.iter().any(|a| a.action == ActionKind::Update));
    assert!(cache.get(KEY_VENDOR_UPDATE).is_some());
}

#[test]
fn test_configuration_change_re_emits_vendor_update() {
    let (deriver, _) = fresh();
    deriver.derive(&vendor_signal("a"), true).unwrap();
    assert!(deriver.derive(&vendor_signal("a"), true).unwrap().is_empty());

    let changed = deriver.derive(&vendor_signal("b"), true).unwrap();
    let update = changed
        .iter()
        .find(|a| a.action == ActionKind::Update)
        .expect("vendor update re-emitted");
    assert_eq!(update.files[0].content, "b");
}

// ── Exclusivity ───────────────────────────────────────────────────────────────

#[test]
fn test_both_tracer_modes_yield_no_tracer_action() {
    let (deriver, _) = fresh();
    let s = signal(
        r#"{"signal":{"type":"update","agents":{
            "datadog-tracer-library":{"version":"1.0","language":"java"},
            "datadog-tracer-single-step":{"version":"1.0"}
        }}}"#,
    );
    assert!(deriver.derive(&s, true).unwrap().is_empty());
}

#[test]
fn test_single_step_drops_vendor_agent_install() {
    let (deriver, _) = fresh();
    let s = signal(
        r#"{"signal":{"type":"update","agents":{
            "datadog-agent":{"version":"7.52.0","api-key":"k","site":"datadoghq.com"},
            "datadog-tracer-single-step":{"version":"1","install_with_env_vars":[
                {"name":"DD_APM_INSTRUMENTATION_ENABLED","value":"host"},
                {"name":"DD_APM_INSTRUMENTATION_LIBRARIES","value":"java:1"}
            ]}
        }}}"#,
    );
    let actions = deriver.derive(&s, false).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].mode, Mode::SingleStep);
    assert!(!actions.iter().any(Action::is_vendor_agent));
}

#[test]
fn test_tracing_library_action_shape() {
    let (deriver, _) = fresh();
    let s = signal(
        r#"{"signal":{"type":"update","agents":{
            "datadog-tracer-library":{"version":"1.31.0","language":"python","path_tracer":"/opt/app"}
        }}}"#,
    );
    let actions = deriver.derive(&s, true).unwrap();
    assert_eq!(actions.len(), 1);
    let tracer = &actions[0];
    assert_eq!(tracer.component, Component::Tracer);
    assert_eq!(tracer.mode, Mode::TracingLibrary);
    assert_eq!(tracer.component_env("language"), Some("python"));
    assert_eq!(tracer.component_env("version"), Some("1.31.0"));
    assert!(tracer.envs.is_empty(), "no vendor version, no credentials");
}

#[test]
fn test_unknown_signal_type_yields_nothing() {
    let (deriver, _) = fresh();
    let s = signal(r#"{"signal":{"type":"reboot","agents":{"docp-agent":{"version":"1.0.0"}}}}"#);
    assert!(deriver.derive(&s, true).unwrap().is_empty());
}

// ── Properties ────────────────────────────────────────────────────────────────

fn arb_version() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[0-9]\\.[0-9]{1,2}\\.[0-9]", Just("latest".to_string())]
}

proptest! {
    /// Deriving the same signal twice yields an empty second list.
    #[test]
    fn prop_derivation_is_idempotent(
        uninstall in any::<bool>(),
        core in arb_version(),
        vendor in arb_version(),
        library in arb_version(),
        single_step in arb_version(),
        installed in any::<bool>(),
    ) {
        let kind = if uninstall { "uninstall" } else { "update" };
        let s = signal(&format!(
            r#"{{"signal":{{"type":"{kind}","remove_other_vendors":["datadog"],"agents":{{
                "docp-agent":{{"version":"{core}"}},
                "datadog-agent":{{"version":"{vendor}","api-key":"k","site":"datadoghq.com"}},
                "datadog-tracer-library":{{"version":"{library}","language":"java"}},
                "datadog-tracer-single-step":{{"version":"{single_step}"}}
            }}}}}}"#
        ));
        let (deriver, _) = fresh();
        deriver.derive(&s, installed).unwrap();
        prop_assert!(deriver.derive(&s, installed).unwrap().is_empty());
    }

    /// Setting both tracer versions never yields a tracer action.
    #[test]
    fn prop_tracer_modes_are_exclusive(
        library in "[0-9]\\.[0-9]",
        single_step in "[0-9]\\.[0-9]",
        installed in any::<bool>(),
    ) {
        let s = signal(&format!(
            r#"{{"signal":{{"type":"update","agents":{{
                "datadog-tracer-library":{{"version":"{library}","language":"go"}},
                "datadog-tracer-single-step":{{"version":"{single_step}"}}
            }}}}}}"#
        ));
        let (deriver, _) = fresh();
        let actions = deriver.derive(&s, installed).unwrap();
        prop_assert!(actions.iter().all(|a| a.component != Component::Tracer));
    }
}
