//! Unit tests for the docp manager
//!
//! These tests drive services through in-memory fakes and a scripted command
//! runner. Nothing touches the network or the host's services.

mod architecture;
mod derive_actions;
mod notifier;
mod version_update;
