//! Application service: idempotent action derivation.
//!
//! Each action kind is fingerprinted and compared with the fingerprint
//! recorded for it in the [`HashCache`]. Only changed kinds are emitted.

use std::sync::Arc;

use anyhow::Result;
use docp_common::action::Action;
use docp_common::signal::SignalSpec;

use crate::application::hash_cache::HashCache;
use crate::domain::actions::{
    KEY_CORE_AGENT, KEY_TRACER_LIBRARY, KEY_TRACER_SINGLE_STEP, KEY_VENDOR_AGENT,
    KEY_VENDOR_UPDATE, core_agent_action, drop_agent_when_single_step, tracer_library_action,
    tracer_single_step_action, vendor_agent_action, vendor_update_action,
};
use crate::domain::digest::fingerprint;

/// One fingerprinted candidate, staged before any cache write.
struct Staged {
    key: &'static str,
    value: String,
    candidate: Option<Action>,
    /// Kinds that may only be recorded when their precondition holds.
    eligible: bool,
}

pub struct ActionDeriver {
    cache: Arc<HashCache>,
}

impl ActionDeriver {
    #[must_use]
    pub fn new(cache: Arc<HashCache>) -> Self {
        Self { cache }
    }

    /// Actions to apply for `signal`, in derivation order.
    ///
    /// `vendor_installed` is the live install state of the vendor agent. It
    /// is folded into the vendor install fingerprint and gates the vendor
    /// update kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a candidate cannot be serialized or a fingerprint
    /// cannot be recorded. No fingerprint is written when serialization fails.
    pub fn derive(&self, signal: &SignalSpec, vendor_installed: bool) -> Result<Vec<Action>> {
        let vendor_agent = vendor_agent_action(signal);
        let staged = [
            Staged {
                key: KEY_CORE_AGENT,
                value: fingerprint(&core_agent_action(signal))?,
                candidate: core_agent_action(signal),
                eligible: true,
            },
            Staged {
                key: KEY_VENDOR_AGENT,
                value: format!("{}.{vendor_installed}", fingerprint(&vendor_agent)?),
                candidate: vendor_agent,
                eligible: true,
            },
            Staged {
                key: KEY_VENDOR_UPDATE,
                value: fingerprint(&vendor_update_action(signal))?,
                candidate: vendor_update_action(signal),
                eligible: vendor_installed,
            },
            Staged {
                key: KEY_TRACER_LIBRARY,
                value: fingerprint(&tracer_library_action(signal))?,
                candidate: tracer_library_action(signal),
                eligible: true,
            },
            Staged {
                key: KEY_TRACER_SINGLE_STEP,
                value: fingerprint(&tracer_single_step_action(signal))?,
                candidate: tracer_single_step_action(signal),
                eligible: true,
            },
        ];

        let mut actions = Vec::new();
        for stage in staged {
            if !stage.eligible {
                continue;
            }
            let changed = self.cache.replace_if_changed(stage.key, &stage.value)?;
            if let (true, Some(action)) = (changed, stage.candidate) {
                tracing::debug!(key = stage.key, "action fingerprint changed");
                actions.push(action);
            }
        }

        let actions = drop_agent_when_single_step(actions);
        tracing::debug!(count = actions.len(), vendor_installed, "derived actions");
        Ok(actions)
    }
}
