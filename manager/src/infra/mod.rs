//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, file
//! persistence, HTTP clients for the control plane and the local agent API,
//! and the systemd, apt and release-script adapters.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::application::services` are forbidden.

pub mod command_runner;
pub mod config;
pub mod control_plane;
pub mod datadog;
pub mod local_agent;
pub mod release;
pub mod state;
pub mod systemd;
