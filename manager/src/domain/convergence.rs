//! Whether live service state matches what a signal demands.

use docp_common::signal::SignalSpec;

use crate::domain::service::ServiceStatus;

/// A component converges when it runs if requested and is absent otherwise.
#[must_use]
pub fn component_converged(desired_version: &str, status: &ServiceStatus) -> bool {
    if desired_version.is_empty() {
        !status.is_active()
    } else {
        status.is_active()
    }
}

/// Per-component convergence of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convergence {
    pub core_agent: bool,
    pub vendor_agent: bool,
}

impl Convergence {
    #[must_use]
    pub fn evaluate(signal: &SignalSpec, core: &ServiceStatus, vendor: &ServiceStatus) -> Self {
        Self {
            core_agent: component_converged(&signal.agents.docp_agent.version, core),
            vendor_agent: component_converged(&signal.agents.datadog_agent.version, vendor),
        }
    }

    #[must_use]
    pub fn is_converged(self) -> bool {
        self.core_agent && self.vendor_agent
    }
}
