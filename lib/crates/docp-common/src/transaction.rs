use serde::{Deserialize, Serialize};

/// Position of a status report within its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Open,
    Update,
    Close,
}

/// One status report posted to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    /// Stable for every report of one operation.
    pub id: String,
    /// Unique per report.
    pub ulid_event: String,
    #[serde(rename = "type")]
    pub event: EventType,
    /// Phase name, e.g. `update_docp_received`.
    pub status: String,
    pub message: String,
}
