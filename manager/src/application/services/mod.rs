pub mod auto_update;
pub mod core_agent;
pub mod derive;
pub mod dispatch;
pub mod notifier;
pub mod poll;
pub mod reconcile;
pub mod vendor;
pub mod version_update;
