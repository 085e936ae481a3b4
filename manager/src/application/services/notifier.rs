//! Application service: transaction status reporting.
//!
//! Every operation is bracketed by an open, zero or more updates and a close,
//! all sharing one transaction id. When the control plane answers with a 5xx
//! the notifier locks: later reports are queued in arrival order and replayed
//! by [`TransactionNotifier::flush_pending`] until the queue is empty.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use docp_common::transaction::{EventType, TransactionStatus};
use tokio::sync::Mutex;
use ulid::Ulid;
use uuid::Uuid;

use crate::application::ports::{Authenticator, ConfigStore, STATUS_FORBIDDEN, SignalSource};
use crate::domain::TransportError;

/// Correlation id shared by every report of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: String,
}

impl Transaction {
    #[must_use]
    pub fn begin() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Phase names reported around one bracketed operation.
#[derive(Debug, Clone, Copy)]
pub struct Phases {
    pub received: &'static str,
    pub processing: &'static str,
    pub completed: &'static str,
    pub error: &'static str,
}

/// What happened to one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Sent again after a token refresh. The retry result is only logged.
    Retried,
    Queued,
    /// No access token yet.
    Skipped,
}

#[derive(Debug, Default)]
struct Backlog {
    locked: bool,
    pending: VecDeque<TransactionStatus>,
}

pub struct TransactionNotifier {
    source: Arc<dyn SignalSource>,
    auth: Arc<dyn Authenticator>,
    config: Arc<dyn ConfigStore>,
    backlog: Mutex<Backlog>,
    phase_delay: Duration,
}

impl TransactionNotifier {
    pub const DEFAULT_PHASE_DELAY: Duration = Duration::from_secs(1);

    #[must_use]
    pub fn new(
        source: Arc<dyn SignalSource>,
        auth: Arc<dyn Authenticator>,
        config: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            source,
            auth,
            config,
            backlog: Mutex::new(Backlog::default()),
            phase_delay: Self::DEFAULT_PHASE_DELAY,
        }
    }

    /// Pause after each delivered report. Zero disables pacing.
    #[must_use]
    pub fn with_phase_delay(mut self, delay: Duration) -> Self {
        self.phase_delay = delay;
        self
    }

    /// Send or queue one report.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read, the request fails, the
    /// token refresh fails, or the control plane answers with a status that
    /// is neither success, 403 nor 5xx.
    pub async fn notify(
        &self,
        tx: &Transaction,
        phase: &str,
        event: EventType,
        message: &str,
    ) -> Result<Delivery> {
        let config = self
            .config
            .load()
            .await
            .context("loading agent config for status report")?;
        if config.access_token.is_empty() {
            tracing::debug!(phase, "no access token, status report skipped");
            return Ok(Delivery::Skipped);
        }

        let status = TransactionStatus {
            id: tx.id().to_string(),
            ulid_event: Ulid::new().to_string(),
            event,
            status: phase.to_string(),
            message: message.to_string(),
        };

        {
            let mut backlog = self.backlog.lock().await;
            if backlog.locked {
                backlog.pending.push_back(status);
                tracing::debug!(phase, pending = backlog.pending.len(), "status report queued");
                return Ok(Delivery::Queued);
            }
        }

        let delivery = self.deliver(status).await?;
        if !self.phase_delay.is_zero() {
            tokio::time::sleep(self.phase_delay).await;
        }
        Ok(delivery)
    }

    async fn deliver(&self, status: TransactionStatus) -> Result<Delivery> {
        let reply = self
            .source
            .post_status(&status)
            .await
            .context("posting transaction status")?;
        if reply.is_success() {
            return Ok(Delivery::Sent);
        }

        if reply.status == STATUS_FORBIDDEN {
            self.auth
                .reauthenticate()
                .await
                .context("refreshing access token after 403")?;
            match self.source.post_status(&status).await {
                Ok(retry) if retry.is_success() => {}
                Ok(retry) => {
                    tracing::warn!(phase = %status.status, status = retry.status, "status retry rejected");
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::warn!(phase = %status.status, %error, "status retry failed");
                }
            }
            return Ok(Delivery::Retried);
        }

        if reply.is_server_error() {
            let mut backlog = self.backlog.lock().await;
            backlog.locked = true;
            backlog.pending.push_back(status);
            tracing::warn!(status = reply.status, "control plane unavailable, status reports locked");
            return Ok(Delivery::Queued);
        }

        Err(TransportError::UnexpectedStatus {
            endpoint: "transaction".to_string(),
            status: reply.status,
        }
        .into())
    }

    /// Replay queued reports in order. Unlocks once the queue is empty.
    ///
    /// Stops at the first 5xx, leaving that report at the head of the queue.
    /// A 403 gets one retry after a token refresh; if that retry is rejected
    /// with anything but a 5xx the report is dropped. Returns the number of
    /// reports delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if a request fails outright or the token refresh
    /// fails. The failing report stays queued.
    pub async fn flush_pending(&self) -> Result<usize> {
        let mut backlog = self.backlog.lock().await;
        if !backlog.locked {
            return Ok(0);
        }

        let mut sent = 0;
        while let Some(status) = backlog.pending.pop_front() {
            let reply = match self.source.post_status(&status).await {
                Ok(reply) => reply,
                Err(e) => {
                    backlog.pending.push_front(status);
                    return Err(e.context("flushing queued status reports"));
                }
            };

            if reply.is_success() {
                sent += 1;
                continue;
            }
            if reply.is_server_error() {
                backlog.pending.push_front(status);
                tracing::debug!(sent, pending = backlog.pending.len(), "control plane still unavailable");
                return Ok(sent);
            }
            if reply.status == STATUS_FORBIDDEN {
                if let Err(e) = self.auth.reauthenticate().await {
                    backlog.pending.push_front(status);
                    return Err(e.context("refreshing access token while flushing"));
                }
                match self.source.post_status(&status).await {
                    Ok(retry) if retry.is_success() => sent += 1,
                    Ok(retry) if retry.is_server_error() => {
                        backlog.pending.push_front(status);
                        tracing::debug!(sent, pending = backlog.pending.len(), "control plane still unavailable");
                        return Ok(sent);
                    }
                    Ok(retry) => {
                        tracing::warn!(phase = %status.status, status = retry.status, "queued status retry rejected, dropped");
                    }
                    Err(e) => {
                        backlog.pending.push_front(status);
                        return Err(e.context("retrying queued status report"));
                    }
                }
                continue;
            }
            tracing::warn!(phase = %status.status, status = reply.status, "queued status report rejected, dropped");
        }

        backlog.locked = false;
        tracing::info!(sent, "status reports unlocked");
        Ok(sent)
    }

    pub async fn is_locked(&self) -> bool {
        self.backlog.lock().await.locked
    }

    pub async fn pending_len(&self) -> usize {
        self.backlog.lock().await.pending.len()
    }

    // ── Bracketing ────────────────────────────────────────────────────────────

    /// Report an opening phase. Failures are logged, never propagated.
    pub async fn open(&self, tx: &Transaction, phase: &str, message: &str) {
        self.notify_logged(tx, phase, EventType::Open, message).await;
    }

    pub async fn update(&self, tx: &Transaction, phase: &str, message: &str) {
        self.notify_logged(tx, phase, EventType::Update, message).await;
    }

    pub async fn close(&self, tx: &Transaction, phase: &str, message: &str) {
        self.notify_logged(tx, phase, EventType::Close, message).await;
    }

    async fn notify_logged(&self, tx: &Transaction, phase: &str, event: EventType, message: &str) {
        if let Err(e) = self.notify(tx, phase, event, message).await {
            let error = format!("{e:#}");
            tracing::warn!(transaction = tx.id(), phase, %error, "status report failed");
        }
    }

    /// Run `work` inside a fresh transaction: open, processing, then a
    /// completed or error close carrying the failure text.
    ///
    /// # Errors
    ///
    /// Returns the error of `work` unchanged.
    pub async fn bracket<T, F>(&self, phases: &Phases, message: &str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let tx = Transaction::begin();
        self.open(&tx, phases.received, message).await;
        self.update(&tx, phases.processing, message).await;
        match work.await {
            Ok(value) => {
                self.close(&tx, phases.completed, message).await;
                Ok(value)
            }
            Err(e) => {
                self.close(&tx, phases.error, &format!("{e:#}")).await;
                Err(e)
            }
        }
    }
}
