//! Read access to build history and retry-count resolution.
//!
//! History is append-only: a job's builds are recorded in increasing number
//! order and never change afterwards. The resolver only walks backwards
//! through `predecessor` links.

use std::collections::BTreeMap;
use std::sync::RwLock;

use log::{debug, warn};

use crate::domain::{BuildNumber, BuildRecord};
use crate::error::{Result, RetriggerError};

/// Upper bound on predecessor hops while counting a lineage.
pub const MAX_HISTORY_WALK: u32 = 10_000;

/// Narrow read interface over finished builds.
pub trait BuildHistory: Send + Sync {
    /// Look up a top-level build of `job`
    fn build(&self, job: &str, number: BuildNumber) -> Option<BuildRecord>;

    /// Immediate predecessor of `build` in its job
    fn predecessor(&self, build: &BuildRecord) -> Option<BuildRecord> {
        build.predecessor.and_then(|n| self.build(&build.job, n))
    }
}

/// In-process history keyed by job and build number.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    builds: RwLock<BTreeMap<String, BTreeMap<BuildNumber, BuildRecord>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished build. Numbers must increase within a job.
    pub fn append(&self, build: BuildRecord) -> Result<()> {
        let mut builds = self.builds.write().unwrap_or_else(|e| e.into_inner());
        let job = builds.entry(build.job.clone()).or_default();
        if let Some(&last) = job.keys().next_back() {
            if build.number <= last {
                return Err(RetriggerError::InvalidHistory(format!(
                    "{} recorded after #{}",
                    build.display_name(),
                    last
                )));
            }
        }
        job.insert(build.number, build);
        Ok(())
    }

    /// Most recent build of `job`
    pub fn last(&self, job: &str) -> Option<BuildRecord> {
        let builds = self.builds.read().unwrap_or_else(|e| e.into_inner());
        builds.get(job).and_then(|j| j.values().next_back().cloned())
    }

    pub fn len(&self, job: &str) -> usize {
        let builds = self.builds.read().unwrap_or_else(|e| e.into_inner());
        builds.get(job).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        let builds = self.builds.read().unwrap_or_else(|e| e.into_inner());
        builds.values().all(BTreeMap::is_empty)
    }
}

impl BuildHistory for InMemoryHistory {
    fn build(&self, job: &str, number: BuildNumber) -> Option<BuildRecord> {
        let builds = self.builds.read().unwrap_or_else(|e| e.into_inner());
        builds.get(job).and_then(|j| j.get(&number)).cloned()
    }
}

/// Retries already consumed by the lineage `build` belongs to.
///
/// Builds carrying an explicit count return it directly. Markers without a
/// count come from older schedulers; for those the consecutive run of marked
/// builds ending at `build` is counted instead. The walk stops at the first
/// unmarked predecessor, at any link that does not point strictly backwards,
/// or after `MAX_HISTORY_WALK` hops.
pub fn resolve_retry_count(build: &BuildRecord, history: &dyn BuildHistory) -> u32 {
    let Some(marker) = build.marker else {
        return 0;
    };
    if marker.retry_count > 0 {
        return marker.retry_count;
    }

    let mut count = 1;
    let mut last = build.number;
    let mut cursor = history.predecessor(build);
    while let Some(prev) = cursor {
        if prev.marker.is_none() {
            break;
        }
        if prev.number >= last {
            warn!(
                "History link from {} #{} to #{} does not point backwards, stopping walk",
                build.job, last, prev.number
            );
            break;
        }
        if count >= MAX_HISTORY_WALK {
            warn!("History walk for {} hit the {} build limit", build.display_name(), MAX_HISTORY_WALK);
            break;
        }
        count += 1;
        last = prev.number;
        cursor = history.predecessor(&prev);
    }

    debug!("Resolved legacy retry count {} for {}", count, build.display_name());
    count
}
