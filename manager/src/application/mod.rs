//! Application layer: port trait definitions and the reconciliation services.
//!
//! This module depends only on `crate::domain` and the shared wire types,
//! never on `crate::infra`.

pub mod error_sink;
pub mod hash_cache;
pub mod ports;
pub mod services;
