//! CLI module for retrigger - command-line interface and subcommands.
//!
//! Operator tools for checking a retry configuration before a host uses it.

pub mod commands;

pub use commands::Cli;
