//! Domain types for Retrigger
//!
//! This module contains the records the retry core reads and writes:
//! - BuildRecord: a finished build or one variant of a composite build
//! - RetryMarker: retry bookkeeping attached to every rescheduled build
//! - Cause: provenance of a build, rewritten for each retry

pub mod build;
pub mod cause;
pub mod marker;

pub use build::{BuildNumber, BuildRecord, BuildResult, Combination, LogRef};
pub use cause::{Cause, rewrite_causes};
pub use marker::{ENV_RETRY_BUILD_NUMBER, ENV_RETRY_COUNT, ENV_RETRY_MAX_COUNT, RetryMarker, retry_environment};
