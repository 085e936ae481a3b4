//! Domain layer: pure types and rules.
//!
//! Nothing here performs I/O or awaits.

pub mod actions;
pub mod convergence;
pub mod digest;
pub mod error;
pub mod phase;
pub mod service;

pub use convergence::Convergence;
pub use error::{ActionError, CacheError, Severity, TransportError, UpdateError};
pub use service::{Service, ServiceStatus};
