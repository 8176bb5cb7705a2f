//! Reschedule decisions for a single build or variant.
//!
//! The default rules, first "no" wins:
//! 1. Success or Aborted: no
//! 2. Unstable without unstable tolerance: no
//! 3. Retry budget set and used up: no
//! 4. Log gate configured, applicable, and not matched: no
//! 5. Otherwise: yes

pub mod request;

use async_trait::async_trait;
use log::{debug, warn};

use crate::domain::BuildRecord;
use crate::scan::LogScanner;
pub use request::{CompositePatternStrategy, NoMatchStrategy, ScheduleRequest};

/// Answer of a decision for one build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    pub schedule: bool,
    /// Retry budget read from the build's own log
    pub budget_override: Option<i32>,
}

impl Decision {
    pub fn yes() -> Self {
        Self {
            schedule: true,
            budget_override: None,
        }
    }

    pub fn no() -> Self {
        Self::default()
    }

    pub fn with_budget_override(mut self, budget: Option<i32>) -> Self {
        self.budget_override = budget;
        self
    }
}

impl From<bool> for Decision {
    fn from(schedule: bool) -> Self {
        if schedule { Self::yes() } else { Self::no() }
    }
}

/// Pluggable reschedule rules for a [`ScheduleRequest`]
#[async_trait]
pub trait ScheduleDecision: Send + Sync {
    /// Decide for a standalone or composite build.
    ///
    /// `retry_count` is 0 the first time the lineage fails.
    async fn should_schedule(
        &self,
        request: &ScheduleRequest,
        scanner: &LogScanner,
        build: &BuildRecord,
        retry_count: u32,
    ) -> Decision;

    /// Decide whether one variant goes into a partial rerun.
    ///
    /// A budget read from the variant's own log is reported the same way
    /// as for a whole build.
    async fn should_schedule_variant(
        &self,
        request: &ScheduleRequest,
        scanner: &LogScanner,
        variant: &BuildRecord,
    ) -> Decision;
}

/// The standard rules listed in the module docs
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecision;

#[async_trait]
impl ScheduleDecision for DefaultDecision {
    async fn should_schedule(
        &self,
        request: &ScheduleRequest,
        scanner: &LogScanner,
        build: &BuildRecord,
        retry_count: u32,
    ) -> Decision {
        if !request.passes_threshold(build.result) {
            debug!("{} finished {}, not retrying", build.display_name(), build.result);
            return Decision::no();
        }
        if !request.within_budget_for(build, retry_count) {
            debug!(
                "{} used {} of {} retries",
                build.display_name(),
                retry_count,
                request.budget_for(build)
            );
            return Decision::no();
        }
        let Some(pattern) = request.gate() else {
            return Decision::yes();
        };

        let strategy = request.get_composite_strategy();
        if !build.is_composite() || strategy == CompositePatternStrategy::TestParent {
            let outcome = scanner.scan(&build.log, pattern).await;
            if !outcome.is_match() {
                debug!("Pattern '{}' not in log of {}", pattern, build.display_name());
                return Decision::no();
            }
            return Decision::yes().with_budget_override(request.budget_override(&outcome));
        }

        match strategy {
            CompositePatternStrategy::TestChildrenRetriggerAll => {
                for variant in build.exact_variants() {
                    if !request.passes_threshold(variant.result) {
                        continue;
                    }
                    let outcome = scanner.scan(&variant.log, pattern).await;
                    if outcome.is_match() {
                        return Decision::yes().with_budget_override(request.budget_override(&outcome));
                    }
                }
                debug!("Pattern '{}' matched no failing variant of {}", pattern, build.display_name());
                Decision::no()
            }
            _ => {
                if !request.is_rerun_partial_only() {
                    warn!(
                        "{}: test-children-retrigger-matched has no effect without rerun-partial-only",
                        build.display_name()
                    );
                }
                // variants are tested one by one during partial rerun
                Decision::yes()
            }
        }
    }

    async fn should_schedule_variant(
        &self,
        request: &ScheduleRequest,
        scanner: &LogScanner,
        variant: &BuildRecord,
    ) -> Decision {
        if !request.passes_threshold(variant.result) {
            return Decision::no();
        }
        match request.gate() {
            Some(pattern)
                if request.get_composite_strategy() == CompositePatternStrategy::TestChildrenRetriggerMatched =>
            {
                let outcome = scanner.scan(&variant.log, pattern).await;
                if outcome.is_match() {
                    Decision::yes().with_budget_override(request.budget_override(&outcome))
                } else {
                    Decision::no()
                }
            }
            _ => Decision::yes(),
        }
    }
}
