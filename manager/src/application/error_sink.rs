//! Process-wide error queue.
//!
//! Lanes and periodic cycles never propagate failures upward; they push a
//! tagged report here and carry on. A single consumer logs reports that pass
//! the configured severity threshold.

use tokio::sync::mpsc;

use crate::domain::Severity;

#[derive(Debug)]
pub struct ErrorReport {
    /// Operation that failed, e.g. `vendor_lane`.
    pub source: &'static str,
    pub severity: Severity,
    pub error: anyhow::Error,
}

#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<ErrorReport>,
}

impl ErrorSink {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ErrorReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, source: &'static str, severity: Severity, error: anyhow::Error) {
        if let Err(mpsc::error::SendError(report)) = self.tx.send(ErrorReport {
            source,
            severity,
            error,
        }) {
            // consumer already gone during shutdown
            let error = format!("{:#}", report.error);
            tracing::error!(source = report.source, %error, "unreported failure");
        }
    }
}

/// Consume reports until every [`ErrorSink`] clone is dropped.
pub async fn drain_errors(mut rx: mpsc::UnboundedReceiver<ErrorReport>, threshold: Severity) {
    while let Some(report) = rx.recv().await {
        log_report(&report, threshold);
    }
}

fn log_report(report: &ErrorReport, threshold: Severity) {
    if !report.severity.within(threshold) {
        return;
    }
    let error = format!("{:#}", report.error);
    match report.severity {
        Severity::High => tracing::error!(source = report.source, %error, "operation failed"),
        Severity::Medium => tracing::warn!(source = report.source, %error, "operation failed"),
        Severity::Low => tracing::info!(source = report.source, %error, "operation failed"),
    }
}
