//! Bounded polling shared by update, install and teardown waits.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

/// Tick interval, optional attempt budget and overall deadline of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub tick: Duration,
    /// `None` polls until the deadline.
    pub max_attempts: Option<u32>,
    pub deadline: Duration,
}

impl PollPolicy {
    /// Health poll after a vendor version update.
    pub const VENDOR_UPDATE: Self = Self {
        tick: Duration::from_secs(30),
        max_attempts: Some(10),
        deadline: Duration::from_secs(10 * 60),
    };

    /// Wait for a freshly installed vendor agent to come up.
    pub const VENDOR_INSTALL: Self = Self {
        tick: Duration::from_secs(20),
        max_attempts: None,
        deadline: Duration::from_secs(10 * 60),
    };

    /// Wait for a vendor uninstall to finish before a single-step reinstall.
    pub const VENDOR_REINSTALL: Self = Self {
        tick: Duration::from_secs(20),
        max_attempts: None,
        deadline: Duration::from_secs(5 * 60),
    };

    /// Wait for other vendors to be torn down before the core agent leaves.
    pub const VENDOR_TEARDOWN: Self = Self {
        tick: Duration::from_secs(60),
        max_attempts: None,
        deadline: Duration::from_secs(30 * 60),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    Exhausted,
    DeadlineExceeded,
}

/// Run `check` once per tick until it reports `true`.
///
/// The first check happens one tick after the call. A check error is logged
/// and counts as a failed attempt.
pub async fn poll_until<F, Fut>(policy: PollPolicy, mut check: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let attempts = async {
        let mut ticker = tokio::time::interval_at(Instant::now() + policy.tick, policy.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt = 0u32;
        loop {
            ticker.tick().await;
            attempt += 1;
            match check().await {
                Ok(true) => return PollOutcome::Ready,
                Ok(false) => tracing::debug!(attempt, "condition not met yet"),
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::warn!(attempt, %error, "poll check failed");
                }
            }
            if policy.max_attempts.is_some_and(|max| attempt >= max) {
                return PollOutcome::Exhausted;
            }
        }
    };
    tokio::time::timeout(policy.deadline, attempts)
        .await
        .unwrap_or(PollOutcome::DeadlineExceeded)
}
