//! Application service: action fan-out onto per-component lanes.
//!
//! Each lane is an unbounded FIFO drained by one long-lived consumer, so
//! operations on one component never overlap. Lane failures go to the
//! [`ErrorSink`] and the consumer moves on to the next action.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use docp_common::action::{Action, ActionKind, ActionType};
use docp_common::signal::SignalEnvelope;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::application::error_sink::ErrorSink;
use crate::application::ports::{StateSlot, StateStore};
use crate::application::services::core_agent::CoreAgentService;
use crate::application::services::vendor::VendorLane;
use crate::domain::Severity;

pub const CORE_LANE: &str = "core_agent_lane";
pub const VENDOR_LANE: &str = "vendor_lane";

/// Consumer of one lane.
#[async_trait]
pub trait LaneHandler: Send + Sync + 'static {
    /// Handle one action. Long-running follow-ups go onto `tasks`.
    async fn handle(&self, action: Action, tasks: &mut JoinSet<()>) -> Result<()>;
}

#[async_trait]
impl LaneHandler for VendorLane {
    async fn handle(&self, action: Action, tasks: &mut JoinSet<()>) -> Result<()> {
        self.process(action, tasks).await
    }
}

/// Core agent lane: update and self-removal.
#[derive(Clone)]
pub struct CoreLane {
    core: Arc<CoreAgentService>,
    state: Arc<dyn StateStore>,
}

impl CoreLane {
    #[must_use]
    pub fn new(core: Arc<CoreAgentService>, state: Arc<dyn StateStore>) -> Self {
        Self { core, state }
    }

    /// Vendors the received signal asks to remove alongside the core agent.
    async fn vendors_to_remove(&self) -> Result<Vec<String>> {
        let Some(bytes) = self.state.load(StateSlot::Received).await? else {
            return Ok(Vec::new());
        };
        let envelope =
            SignalEnvelope::from_slice(&bytes).context("parsing received signal")?;
        Ok(envelope.signal.remove_other_vendors)
    }
}

#[async_trait]
impl LaneHandler for CoreLane {
    async fn handle(&self, action: Action, _tasks: &mut JoinSet<()>) -> Result<()> {
        match action.action {
            ActionKind::Update => {
                let outcome = self.core.update(&action.version).await?;
                tracing::info!(?outcome, "core agent update handled");
                Ok(())
            }
            ActionKind::Uninstall => {
                let vendors = self.vendors_to_remove().await?;
                self.core.auto_uninstall(&vendors).await
            }
            ActionKind::Install => self.core.ensure_installed().await.map(|_| ()),
        }
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

struct Senders {
    core: mpsc::UnboundedSender<Action>,
    vendor: mpsc::UnboundedSender<Action>,
}

/// Receiving ends, one per lane.
pub struct LaneReceivers {
    pub core: mpsc::UnboundedReceiver<Action>,
    pub vendor: mpsc::UnboundedReceiver<Action>,
}

pub struct Dispatcher {
    senders: RwLock<Option<Senders>>,
}

impl Dispatcher {
    #[must_use]
    pub fn channel() -> (Self, LaneReceivers) {
        let (core_tx, core_rx) = mpsc::unbounded_channel();
        let (vendor_tx, vendor_rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            senders: RwLock::new(Some(Senders {
                core: core_tx,
                vendor: vendor_tx,
            })),
        };
        (
            dispatcher,
            LaneReceivers {
                core: core_rx,
                vendor: vendor_rx,
            },
        )
    }

    /// Route each action onto its lane, preserving order within a lane.
    ///
    /// # Errors
    ///
    /// Returns an error once the dispatcher is closed or a lane consumer is gone.
    pub fn dispatch(&self, actions: Vec<Action>) -> Result<()> {
        let guard = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let senders = guard.as_ref().ok_or_else(|| anyhow!("dispatcher closed"))?;
        for action in actions {
            let (lane, tx) = match action.action_type {
                ActionType::CoreAgent => (CORE_LANE, &senders.core),
                ActionType::Vendor => (VENDOR_LANE, &senders.vendor),
            };
            tx.send(action)
                .map_err(|_| anyhow!("{lane} consumer stopped"))?;
        }
        Ok(())
    }

    /// Drop the senders so lane consumers finish once their queues drain.
    pub fn close(&self) {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Consume `rx` until every sender is gone, then wait for spawned tasks.
pub async fn run_lane<H: LaneHandler>(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<Action>,
    handler: H,
    errors: ErrorSink,
) {
    let mut tasks = JoinSet::new();
    while let Some(action) = rx.recv().await {
        if let Err(e) = handler.handle(action, &mut tasks).await {
            errors.report(name, Severity::Medium, e);
        }
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                errors.report(name, Severity::High, anyhow!(e).context("lane task panicked"));
            }
        }
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            errors.report(name, Severity::High, anyhow!(e).context("lane task panicked"));
        }
    }
    tracing::debug!(lane = name, "lane drained");
}
