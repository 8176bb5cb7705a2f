//! Retry marker attached to every build scheduled as a retry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::build::{BuildNumber, BuildRecord};
use crate::history::BuildHistory;

/// Environment variable carrying the retry count of the current attempt
pub const ENV_RETRY_COUNT: &str = "RETRIGGER_COUNT";
/// Environment variable carrying the retry budget in effect
pub const ENV_RETRY_MAX_COUNT: &str = "RETRIGGER_MAXCOUNT";
/// Environment variable carrying the build number being retried
pub const ENV_RETRY_BUILD_NUMBER: &str = "RETRIGGER_BUILD_NUMBER";

/// Retry bookkeeping for one rescheduled build. Immutable once attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryMarker {
    /// Retries consumed by this lineage so far
    pub retry_count: u32,

    /// Budget in effect when the marker was created: 0 when unknown,
    /// negative when unlimited
    pub max_retry_count: i32,

    /// Build this one is a retry of
    pub parent_build_number: Option<BuildNumber>,
}

impl RetryMarker {
    pub fn new(retry_count: u32, max_retry_count: i32, parent_build_number: Option<BuildNumber>) -> Self {
        Self {
            retry_count,
            max_retry_count,
            parent_build_number,
        }
    }

    /// Marker left by older schedulers that never recorded a count
    pub fn legacy() -> Self {
        Self::new(0, 0, None)
    }

    /// Variables exposed to the retried build's own execution
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(ENV_RETRY_COUNT.to_string(), self.retry_count.to_string());
        env.insert(ENV_RETRY_MAX_COUNT.to_string(), self.max_retry_count.to_string());
        if let Some(parent) = self.parent_build_number {
            env.insert(ENV_RETRY_BUILD_NUMBER.to_string(), parent.to_string());
        }
        env
    }
}

/// Retry environment for a build about to execute.
///
/// Variants take the marker of their composite build. Falls back to the
/// variant's own marker if the composite cannot be found.
pub fn retry_environment(build: &BuildRecord, history: &dyn BuildHistory) -> BTreeMap<String, String> {
    let root = build.composite.and_then(|n| history.build(&build.job, n));
    let marker = root.as_ref().and_then(|r| r.marker).or(build.marker);
    marker.map(|m| m.environment()).unwrap_or_default()
}
