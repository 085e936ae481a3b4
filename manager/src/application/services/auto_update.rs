//! Application service: follow the newest release for `latest` signals.
//!
//! A signal pinned to `latest` is fingerprinted once, so derivation alone
//! never notices a newer release. This cycle re-reads the received signal on
//! a slow interval and emits a `latest` update for each agent pinned to it.
//! The actions go through the dispatcher like any derived action, so they
//! queue behind whatever the lanes are already running.

use std::sync::Arc;

use anyhow::{Context, Result};
use docp_common::action::{Action, ActionKind, ActionType, Component};
use docp_common::signal::{LATEST, SignalEnvelope, SignalType};

use crate::application::ports::{StateSlot, StateStore};

pub struct AutoUpdater {
    state: Arc<dyn StateStore>,
}

impl AutoUpdater {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    /// Update actions for every agent the received signal pins to `latest`.
    ///
    /// Resolution to a concrete version happens on the lane, right before the
    /// update runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the received signal cannot be read or parsed.
    pub async fn actions(&self) -> Result<Vec<Action>> {
        let Some(bytes) = self.state.load(StateSlot::Received).await? else {
            return Ok(Vec::new());
        };
        let signal = SignalEnvelope::from_slice(&bytes)
            .context("parsing received signal")?
            .signal;
        if signal.type_signal != SignalType::Update {
            return Ok(Vec::new());
        }

        let mut actions = Vec::new();
        if signal.agents.docp_agent.version == LATEST {
            actions.push(Action::new(ActionType::CoreAgent, ActionKind::Update).with_version(LATEST));
        }
        if signal.agents.datadog_agent.version == LATEST {
            actions.push(
                Action::new(ActionType::Vendor, ActionKind::Update)
                    .with_component(Component::Agent)
                    .with_version(LATEST),
            );
        }
        Ok(actions)
    }
}
