//! Host services the manager supervises and their reported states.

use std::fmt;

/// Services in the fixed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// The docp agent (`docp-agent.service`).
    CoreAgent,
    /// This process (`docp-manager.service`).
    Manager,
    /// The monitoring vendor agent (`datadog-agent.service`).
    Vendor,
}

impl Service {
    /// systemd unit name.
    #[must_use]
    pub fn unit_name(self) -> &'static str {
        match self {
            Self::CoreAgent => "docp-agent.service",
            Self::Manager => "docp-manager.service",
            Self::Vendor => "datadog-agent.service",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CoreAgent => "agent",
            Self::Manager => "manager",
            Self::Vendor => "datadog",
        };
        f.write_str(name)
    }
}

/// Live state of a service as reported by the service manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Active,
    Inactive,
    /// Any transitional or failed state (`activating`, `failed`, ...).
    Other(String),
}

impl ServiceStatus {
    /// Parse raw status output. Quotes and surrounding whitespace are ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw.replace('"', "");
        match cleaned.trim() {
            "active" => Self::Active,
            "inactive" | "" => Self::Inactive,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
            Self::Other(s) => f.write_str(s),
        }
    }
}
