//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ── Cache errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid key length")]
    EmptyKey,
}

// ── Action errors ─────────────────────────────────────────────────────────────

/// Errors raised while building or interpreting an action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("required env {0} is missing from the action")]
    MissingEnv(&'static str),

    #[error("cannot serialize action: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ── Update errors ─────────────────────────────────────────────────────────────

/// Errors raised by version updates, rollbacks and bounded waits.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("installed version not found")]
    InstalledVersionNotFound,

    #[error("version {0} not found in the package repository")]
    VersionNotFound(String),

    #[error("context expired after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("rollback to {version} failed: {reason}")]
    RollbackFailed { version: String, reason: String },
}

// ── Transport errors ──────────────────────────────────────────────────────────

/// Non-success replies from the control plane or the local agent API.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{endpoint} answered with unexpected status {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("authentication failed with status {0}")]
    AuthFailed(u16),

    #[error("local agent rejected {endpoint}: {code} {message}")]
    Rejected {
        endpoint: String,
        code: String,
        message: String,
    },
}

// ── Severity ──────────────────────────────────────────────────────────────────

/// Priority of an error report. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Severity {
    /// Whether a report at `self` passes a sink configured at `threshold`.
    #[must_use]
    pub fn within(self, threshold: Severity) -> bool {
        self <= threshold
    }
}
