//! CLI command implementations.
//!
//! Each submodule implements one codeloop subcommand, with formatting and
//! input handling kept apart from IO where it can be tested.

pub mod clean;
pub mod image;
pub mod init;
pub mod solve;
