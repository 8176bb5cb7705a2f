//! Retrigger - automatic retries for failed CI builds
//!
//! When a build finishes, Retrigger decides whether to queue a new attempt,
//! how long to wait before it starts, and which variants of a composite
//! build must run again. The host supplies build history and a scheduler;
//! see [`orchestrator::Orchestrator`].

pub mod config;
pub mod decision;
pub mod delay;
pub mod domain;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod rerun;
pub mod scan;

pub use error::{Result, RetriggerError};
