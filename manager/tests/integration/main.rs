//! Integration tests for the docp manager binary
//!
//! These spawn the built binary and check the offline subcommands end to end.
