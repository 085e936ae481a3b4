//! Application service: the reconciliation loop.
//!
//! Wires the deriver, dispatcher, lanes and notifier around injected ports
//! and drives them from independent periodic cycles. Cycles share state only
//! through the [`StateStore`], the [`HashCache`], the notifier and the config
//! store.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use docp_common::action::Action;
use docp_common::signal::SignalEnvelope;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::application::error_sink::ErrorSink;
use crate::application::hash_cache::HashCache;
use crate::application::ports::{
    AgentLifecycle, Authenticator, ConfigStore, STATUS_FORBIDDEN, STATUS_NO_CONTENT, STATUS_OK,
    ServiceControl, SignalSource, StateSlot, StateStore, VendorLifecycle,
};
use crate::application::services::auto_update::AutoUpdater;
use crate::application::services::core_agent::CoreAgentService;
use crate::application::services::derive::ActionDeriver;
use crate::application::services::dispatch::{
    CORE_LANE, CoreLane, Dispatcher, LaneReceivers, VENDOR_LANE, run_lane,
};
use crate::application::services::notifier::{Transaction, TransactionNotifier};
use crate::application::services::poll::PollPolicy;
use crate::application::services::vendor::{VendorLane, VendorPolicy};
use crate::application::services::version_update::VersionUpdateController;
use crate::domain::digest::sha256_hex;
use crate::domain::phase::{STATE_COMPLETED, STATE_RECEIVED};
use crate::domain::{Convergence, Service, Severity, TransportError};

// ── Wiring ────────────────────────────────────────────────────────────────────

/// Injected adapters.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SignalSource>,
    pub auth: Arc<dyn Authenticator>,
    pub services: Arc<dyn ServiceControl>,
    pub agent: Arc<dyn AgentLifecycle>,
    pub vendor: Arc<dyn VendorLifecycle>,
    pub config: Arc<dyn ConfigStore>,
    pub state: Arc<dyn StateStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub fetch: Duration,
    pub derive: Duration,
    pub validate: Duration,
    pub compare: Duration,
    pub flush: Duration,
    pub sweep: Duration,
    pub auto_update: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(60),
            derive: Duration::from_secs(20),
            validate: Duration::from_secs(20),
            compare: Duration::from_secs(20),
            flush: Duration::from_secs(30),
            sweep: Duration::from_secs(60),
            auto_update: Duration::from_secs(12 * 60 * 60),
        }
    }
}

/// Timing knobs. Tests shrink these; production uses the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub intervals: Intervals,
    pub phase_delay: Duration,
    pub vendor_update: PollPolicy,
    pub vendor_lane: VendorPolicy,
    pub teardown: PollPolicy,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            intervals: Intervals::default(),
            phase_delay: TransactionNotifier::DEFAULT_PHASE_DELAY,
            vendor_update: PollPolicy::VENDOR_UPDATE,
            vendor_lane: VendorPolicy::default(),
            teardown: PollPolicy::VENDOR_TEARDOWN,
        }
    }
}

/// Lane consumers, handed to [`run`] separately from the shared engine.
pub struct LaneWorkers {
    receivers: LaneReceivers,
    core: CoreLane,
    vendor: VendorLane,
}

impl LaneWorkers {
    /// Split into raw receivers, for callers that inspect dispatch directly.
    #[must_use]
    pub fn into_receivers(self) -> LaneReceivers {
        self.receivers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Received,
    Duplicate,
    NoContent,
    Reauthenticated,
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct ReconcileEngine {
    source: Arc<dyn SignalSource>,
    auth: Arc<dyn Authenticator>,
    services: Arc<dyn ServiceControl>,
    state: Arc<dyn StateStore>,
    cache: Arc<HashCache>,
    deriver: ActionDeriver,
    dispatcher: Dispatcher,
    notifier: Arc<TransactionNotifier>,
    core: Arc<CoreAgentService>,
    auto_updater: AutoUpdater,
    errors: ErrorSink,
    intervals: Intervals,
    converged: AtomicBool,
}

impl ReconcileEngine {
    /// Build the engine and its lane consumers around `ports`.
    #[must_use]
    pub fn build(ports: Collaborators, tuning: Tuning, errors: ErrorSink) -> (Arc<Self>, LaneWorkers) {
        let cache = Arc::new(HashCache::new());
        let notifier = Arc::new(
            TransactionNotifier::new(
                Arc::clone(&ports.source),
                Arc::clone(&ports.auth),
                Arc::clone(&ports.config),
            )
            .with_phase_delay(tuning.phase_delay),
        );
        let versions = Arc::new(
            VersionUpdateController::new(
                Arc::clone(&ports.vendor),
                Arc::clone(&ports.services),
                Arc::clone(&notifier),
            )
            .with_policy(tuning.vendor_update),
        );
        let core = Arc::new(
            CoreAgentService::new(
                Arc::clone(&ports.services),
                Arc::clone(&ports.agent),
                Arc::clone(&ports.config),
                Arc::clone(&notifier),
            )
            .with_teardown_policy(tuning.teardown),
        );
        let vendor_lane = VendorLane::new(
            Arc::clone(&ports.services),
            Arc::clone(&ports.vendor),
            Arc::clone(&ports.config),
            Arc::clone(&notifier),
            Arc::clone(&cache),
            versions,
            errors.clone(),
            tuning.vendor_lane,
        );
        let auto_updater = AutoUpdater::new(Arc::clone(&ports.state));
        let (dispatcher, receivers) = Dispatcher::channel();

        let workers = LaneWorkers {
            receivers,
            core: CoreLane::new(Arc::clone(&core), Arc::clone(&ports.state)),
            vendor: vendor_lane,
        };
        let engine = Arc::new(Self {
            source: ports.source,
            auth: ports.auth,
            services: ports.services,
            state: ports.state,
            deriver: ActionDeriver::new(Arc::clone(&cache)),
            cache,
            dispatcher,
            notifier,
            core,
            auto_updater,
            errors,
            intervals: tuning.intervals,
            converged: AtomicBool::new(false),
        });
        (engine, workers)
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<HashCache> {
        &self.cache
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<TransactionNotifier> {
        &self.notifier
    }

    /// Completion flag set by the last compare cycle.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.converged.load(Ordering::SeqCst)
    }

    // ── Cycles ────────────────────────────────────────────────────────────────

    /// Fetch the signal and persist it as `received` unless unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a failed token refresh, an
    /// unexpected status, or a failed save.
    pub async fn fetch_cycle(&self) -> Result<FetchOutcome> {
        let reply = self
            .source
            .fetch_signal()
            .await
            .context("fetching signal")?;
        match reply.status {
            STATUS_OK => {}
            STATUS_NO_CONTENT => return Ok(FetchOutcome::NoContent),
            STATUS_FORBIDDEN => {
                self.auth
                    .reauthenticate()
                    .await
                    .context("refreshing access token")?;
                return Ok(FetchOutcome::Reauthenticated);
            }
            status => {
                return Err(TransportError::UnexpectedStatus {
                    endpoint: "status/info".to_string(),
                    status,
                }
                .into());
            }
        }

        let stored = self.state.load(StateSlot::Received).await?;
        if stored.is_some_and(|s| sha256_hex(&s) == sha256_hex(&reply.body)) {
            let tx = Transaction::begin();
            self.notifier
                .open(&tx, STATE_RECEIVED, "verify state already exists")
                .await;
            self.notifier
                .close(&tx, STATE_COMPLETED, "state already exists")
                .await;
            return Ok(FetchOutcome::Duplicate);
        }

        self.state
            .save(StateSlot::Received, &reply.body)
            .await
            .context("persisting received signal")?;
        tracing::info!(bytes = reply.body.len(), "new signal received");
        Ok(FetchOutcome::Received)
    }

    /// Derive actions for the received signal without dispatching them.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be read or parsed, the vendor
    /// install state cannot be queried, or derivation fails.
    pub async fn derive_actions(&self) -> Result<Vec<Action>> {
        let Some(bytes) = self.state.load(StateSlot::Received).await? else {
            return Ok(Vec::new());
        };
        let signal = SignalEnvelope::from_slice(&bytes)
            .context("parsing received signal")?
            .signal;
        let installed = self
            .services
            .already_installed(Service::Vendor)
            .await
            .context("checking vendor agent install")?;
        self.deriver.derive(&signal, installed)
    }

    /// # Errors
    ///
    /// Returns an error if derivation fails or a lane is closed.
    pub async fn derive_cycle(&self) -> Result<usize> {
        let actions = self.derive_actions().await?;
        let count = actions.len();
        if count > 0 {
            tracing::info!(count, "dispatching actions");
        }
        self.dispatcher.dispatch(actions)?;
        Ok(count)
    }

    /// Promote `received` to `current` once live state matches it.
    ///
    /// Returns `None` when nothing has been received yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal or a service status cannot be read,
    /// or `current` cannot be saved.
    pub async fn validate_cycle(&self) -> Result<Option<Convergence>> {
        let Some(bytes) = self.state.load(StateSlot::Received).await? else {
            return Ok(None);
        };
        let signal = SignalEnvelope::from_slice(&bytes)
            .context("parsing received signal")?
            .signal;
        let core = self.services.status(Service::CoreAgent).await?;
        let vendor = self.services.status(Service::Vendor).await?;

        let convergence = Convergence::evaluate(&signal, &core, &vendor);
        if convergence.is_converged() {
            self.state
                .save(StateSlot::Current, &bytes)
                .await
                .context("persisting current signal")?;
        } else {
            tracing::debug!(?convergence, %core, %vendor, "signal not converged");
        }
        Ok(Some(convergence))
    }

    /// Whether `received` and `current` hold the same signal.
    ///
    /// # Errors
    ///
    /// Returns an error if either slot cannot be read.
    pub async fn compare_cycle(&self) -> Result<bool> {
        let received = self.state.load(StateSlot::Received).await?;
        let current = self.state.load(StateSlot::Current).await?;
        let same = match (received, current) {
            (Some(r), Some(c)) => sha256_hex(&r) == sha256_hex(&c),
            _ => false,
        };
        self.converged.store(same, Ordering::SeqCst);
        Ok(same)
    }

    /// # Errors
    ///
    /// Returns an error if a queued report cannot be sent.
    pub async fn flush_cycle(&self) -> Result<usize> {
        self.notifier.flush_pending().await
    }

    pub fn sweep_cycle(&self) -> usize {
        let evicted = self.cache.sweep();
        if evicted > 0 {
            tracing::debug!(evicted, "hash cache swept");
        }
        evicted
    }

    /// Queue a `latest` update for each agent pinned to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be read or a lane is closed.
    pub async fn auto_update_cycle(&self) -> Result<usize> {
        let actions = self.auto_updater.actions().await?;
        let count = actions.len();
        if count > 0 {
            tracing::info!(count, "dispatching auto update actions");
        }
        self.dispatcher.dispatch(actions)?;
        Ok(count)
    }

    /// # Errors
    ///
    /// Returns an error if the core agent cannot be installed.
    pub async fn startup(&self) -> Result<bool> {
        self.core.ensure_installed().await
    }
}

// ── Run loop ──────────────────────────────────────────────────────────────────

/// Drive every cycle and both lanes until `shutdown` flips to `true`.
///
/// Lanes finish their queued actions and follow-up tasks before this returns.
pub async fn run(engine: Arc<ReconcileEngine>, workers: LaneWorkers, shutdown: watch::Receiver<bool>) {
    if let Err(e) = engine.startup().await {
        engine.errors.report("startup_install", Severity::High, e);
    }

    let mut lanes = JoinSet::new();
    lanes.spawn(run_lane(
        CORE_LANE,
        workers.receivers.core,
        workers.core,
        engine.errors.clone(),
    ));
    lanes.spawn(run_lane(
        VENDOR_LANE,
        workers.receivers.vendor,
        workers.vendor,
        engine.errors.clone(),
    ));

    let intervals = engine.intervals;
    let mut cycles = JoinSet::new();
    spawn_cycle(&mut cycles, "fetch_signal", intervals.fetch, &engine, &shutdown, |e| async move {
        e.fetch_cycle().await.map(|_| ())
    });
    spawn_cycle(&mut cycles, "derive_actions", intervals.derive, &engine, &shutdown, |e| async move {
        e.derive_cycle().await.map(|_| ())
    });
    spawn_cycle(&mut cycles, "validate_state", intervals.validate, &engine, &shutdown, |e| async move {
        e.validate_cycle().await.map(|_| ())
    });
    spawn_cycle(&mut cycles, "compare_state", intervals.compare, &engine, &shutdown, |e| async move {
        e.compare_cycle().await.map(|_| ())
    });
    spawn_cycle(&mut cycles, "flush_status", intervals.flush, &engine, &shutdown, |e| async move {
        e.flush_cycle().await.map(|_| ())
    });
    spawn_cycle(&mut cycles, "sweep_cache", intervals.sweep, &engine, &shutdown, |e| async move {
        e.sweep_cycle();
        anyhow::Ok(())
    });
    spawn_cycle(&mut cycles, "auto_update", intervals.auto_update, &engine, &shutdown, |e| async move {
        e.auto_update_cycle().await.map(|_| ())
    });
    tracing::info!("reconciliation engine started");

    while let Some(joined) = cycles.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "cycle task panicked");
        }
    }
    engine.dispatcher.close();
    while let Some(joined) = lanes.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "lane task panicked");
        }
    }
    tracing::info!("reconciliation engine stopped");
}

fn spawn_cycle<F, Fut>(
    set: &mut JoinSet<()>,
    name: &'static str,
    every: Duration,
    engine: &Arc<ReconcileEngine>,
    shutdown: &watch::Receiver<bool>,
    cycle: F,
) where
    F: Fn(Arc<ReconcileEngine>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let engine = Arc::clone(engine);
    let mut shutdown = shutdown.clone();
    set.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = cycle(Arc::clone(&engine)).await {
                        engine.errors.report(name, Severity::Medium, e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(cycle = name, "cycle stopped");
    });
}
