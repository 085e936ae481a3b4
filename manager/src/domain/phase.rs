//! Phase names reported in transaction statuses.

// ── Signal dedupe ─────────────────────────────────────────────────────────────

pub const STATE_RECEIVED: &str = "state_received";
pub const STATE_COMPLETED: &str = "state_completed";

// ── Core agent update ─────────────────────────────────────────────────────────

pub const UPDATE_DOCP_RECEIVED: &str = "update_docp_received";
pub const UPDATE_DOCP_INITIATE: &str = "update_docp_initiate";
pub const UPDATE_DOCP_COMPLETED: &str = "update_docp_completed";
pub const UPDATE_DOCP_ERROR: &str = "update_docp_error";

// ── Core agent uninstall ──────────────────────────────────────────────────────

pub const UNINSTALL_DOCP_RECEIVED: &str = "uninstall_docp_received";
pub const UNINSTALL_DOCP_PROCESSING: &str = "uninstall_docp_processing";
pub const UNINSTALL_DOCP_COMPLETED: &str = "uninstall_docp_completed";
pub const UNINSTALL_DOCP_ERROR: &str = "uninstall_docp_error";

// ── Vendor install / uninstall ────────────────────────────────────────────────

pub const INSTALL_VENDOR_RECEIVED: &str = "install_docp_vendor_received";
pub const INSTALL_VENDOR_PROCESSING: &str = "install_docp_vendor_processing";
pub const INSTALL_VENDOR_COMPLETED: &str = "install_docp_vendor_completed";
pub const INSTALL_VENDOR_ERROR: &str = "install_docp_vendor_error";

pub const INSTALL_TRACER_RECEIVED: &str = "install_docp_vendor_tracer_received";
pub const INSTALL_TRACER_PROCESSING: &str = "install_docp_vendor_tracer_processing";
pub const INSTALL_TRACER_COMPLETED: &str = "install_docp_vendor_tracer_completed";
pub const INSTALL_TRACER_ERROR: &str = "install_docp_vendor_tracer_error";

pub const UNINSTALL_VENDOR_RECEIVED: &str = "uninstall_docp_vendor_received";
pub const UNINSTALL_VENDOR_PROCESSING: &str = "uninstall_docp_vendor_processing";
pub const UNINSTALL_VENDOR_COMPLETE: &str = "uninstall_docp_vendor_complete";
pub const UNINSTALL_VENDOR_ERROR: &str = "uninstall_docp_vendor_error";

// ── Vendor configuration ──────────────────────────────────────────────────────

pub const UPDATE_VENDOR_RECEIVED: &str = "update_vendor_received";
pub const UPDATE_VENDOR_PROCESSING: &str = "update_docp_vendor_processing";
pub const UPDATE_VENDOR_COMPLETE: &str = "update_docp_vendor_complete";
pub const UPDATE_VENDOR_ERROR: &str = "update_docp_vendor_error";

// ── Vendor version update ─────────────────────────────────────────────────────

pub const VENDOR_VERSION_RECEIVED: &str = "update_vendor_version_received";
pub const VENDOR_VERSION_PROCESSING: &str = "update_vendor_version_processing";
pub const VENDOR_VERSION_COMPLETE: &str = "update_vendor_version_complete";
pub const VENDOR_VERSION_ERROR: &str = "update_vendor_version_error";
pub const VENDOR_VERSION_ROLLBACK_COMPLETE: &str = "update_vendor_version_with_rollback_complete";
pub const VENDOR_VERSION_ROLLBACK_ERROR: &str = "update_vendor_version_rollback_error";
