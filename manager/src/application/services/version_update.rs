//! Application service: vendor agent version update with rollback.
//!
//! The update is issued, then the vendor service is polled on a fixed tick.
//! If it never reports active within the attempt budget or the deadline, the
//! previously installed version is restored exactly once. Calls are
//! serialized, so a second update waits for the first to confirm or roll back.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::application::ports::{ServiceControl, VendorLifecycle};
use crate::application::services::notifier::{Transaction, TransactionNotifier};
use crate::application::services::poll::{PollOutcome, PollPolicy, poll_until};
use crate::domain::phase::{
    VENDOR_VERSION_COMPLETE, VENDOR_VERSION_ERROR, VENDOR_VERSION_PROCESSING,
    VENDOR_VERSION_RECEIVED, VENDOR_VERSION_ROLLBACK_COMPLETE, VENDOR_VERSION_ROLLBACK_ERROR,
};
use crate::domain::{Service, UpdateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackReason {
    AttemptsExhausted,
    DeadlineExceeded,
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttemptsExhausted => write!(f, "vendor agent not active after every attempt"),
            Self::DeadlineExceeded => write!(f, "vendor agent not active before the deadline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Target already installed, nothing issued.
    AlreadyCurrent,
    Confirmed,
    RolledBack { to: String, reason: RollbackReason },
}

pub struct VersionUpdateController {
    vendor: Arc<dyn VendorLifecycle>,
    services: Arc<dyn ServiceControl>,
    notifier: Arc<TransactionNotifier>,
    policy: PollPolicy,
    in_flight: Mutex<()>,
}

impl VersionUpdateController {
    #[must_use]
    pub fn new(
        vendor: Arc<dyn VendorLifecycle>,
        services: Arc<dyn ServiceControl>,
        notifier: Arc<TransactionNotifier>,
    ) -> Self {
        Self {
            vendor,
            services,
            notifier,
            policy: PollPolicy::VENDOR_UPDATE,
            in_flight: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Move the vendor agent to `target`, rolling back if it fails to start.
    ///
    /// # Errors
    ///
    /// Returns an error if the installed version cannot be read, the update
    /// cannot be issued, or the rollback itself fails.
    pub async fn update_version(&self, target: &str) -> Result<UpdateOutcome> {
        let _in_flight = self.in_flight.lock().await;
        let previous = self
            .vendor
            .version()
            .await
            .context("reading installed vendor version")?;
        if previous == target {
            tracing::debug!(version = target, "vendor agent already at target version");
            return Ok(UpdateOutcome::AlreadyCurrent);
        }

        let tx = Transaction::begin();
        self.notifier
            .open(
                &tx,
                VENDOR_VERSION_RECEIVED,
                &format!("update vendor agent from {previous} to {target}"),
            )
            .await;

        if let Err(e) = self.vendor.update_version(target).await {
            self.notifier
                .close(&tx, VENDOR_VERSION_ERROR, &format!("{e:#}"))
                .await;
            return Err(e.context(format!("updating vendor agent to {target}")));
        }
        self.notifier
            .update(
                &tx,
                VENDOR_VERSION_PROCESSING,
                "waiting for vendor agent to become active",
            )
            .await;

        let services = &self.services;
        let outcome = poll_until(self.policy, || {
            let services = Arc::clone(services);
            async move { anyhow::Ok(services.status(Service::Vendor).await?.is_active()) }
        })
        .await;

        let reason = match outcome {
            PollOutcome::Ready => {
                tracing::info!(from = %previous, to = target, "vendor agent update confirmed");
                self.notifier
                    .close(&tx, VENDOR_VERSION_COMPLETE, &format!("vendor agent at {target}"))
                    .await;
                return Ok(UpdateOutcome::Confirmed);
            }
            PollOutcome::Exhausted => RollbackReason::AttemptsExhausted,
            PollOutcome::DeadlineExceeded => RollbackReason::DeadlineExceeded,
        };
        self.rollback(&tx, previous, reason).await
    }

    async fn rollback(
        &self,
        tx: &Transaction,
        previous: String,
        reason: RollbackReason,
    ) -> Result<UpdateOutcome> {
        tracing::warn!(to = %previous, %reason, "rolling back vendor agent");
        match self.vendor.rollback_version(&previous).await {
            Ok(()) => {
                self.notifier
                    .close(
                        tx,
                        VENDOR_VERSION_ROLLBACK_COMPLETE,
                        &format!("{reason}, rolled back to {previous}"),
                    )
                    .await;
                Ok(UpdateOutcome::RolledBack {
                    to: previous,
                    reason,
                })
            }
            Err(e) => {
                let failure = UpdateError::RollbackFailed {
                    version: previous,
                    reason: format!("{e:#}"),
                };
                self.notifier
                    .close(tx, VENDOR_VERSION_ROLLBACK_ERROR, &failure.to_string())
                    .await;
                Err(failure.into())
            }
        }
    }
}
