pub mod action;
pub mod config;
pub mod signal;
pub mod transaction;

pub use action::{Action, ActionKind, ActionType, Component, ConfigFile, EnvVar, Mode};
pub use config::{AgentConfig, AgentCredentials};
pub use signal::{
    Agents, CoreAgentSpec, SignalEnvelope, SignalError, SignalSpec, SignalType,
    TracerLibrarySpec, TracerSingleStepSpec, VendorAgentSpec, VendorConfigurations,
};
pub use transaction::{EventType, TransactionStatus};
