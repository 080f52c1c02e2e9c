//! Subcommand implementations.

pub(crate) mod call;
pub(crate) mod config;
