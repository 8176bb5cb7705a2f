//! Schedule requests: the retry policy a build carries into its completion check.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RequestConfig;
use crate::decision::{Decision, DefaultDecision, ScheduleDecision};
use crate::delay::ScheduleDelay;
use crate::domain::{BuildRecord, BuildResult};
use crate::error::Result;
use crate::scan::{LogScanner, ScanOutcome};

/// What to do when partial rerun selects no variant at all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoMatchStrategy {
    /// Rerun the whole composite build
    #[default]
    RerunWhole,
    /// Schedule a composite run with no variants in it
    RerunEmpty,
    /// Do not schedule anything for this request
    DontRun,
}

/// How the log pattern applies to composite builds and their variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositePatternStrategy {
    /// Scan the composite's own log once
    TestParent,
    /// Scan each failing variant, rerun only the matching ones
    TestChildrenRetriggerMatched,
    /// Scan each failing variant, rerun all failing ones if any matched
    #[default]
    TestChildrenRetriggerAll,
}

/// Retry policy evaluated once per finished build.
///
/// Read-only during evaluation. The decision rules can be swapped per
/// request through [`ScheduleRequest::decision`].
#[derive(Clone)]
pub struct ScheduleRequest {
    max_schedule: i32,
    delay: ScheduleDelay,
    rerun_partial_only: bool,
    no_match_strategy: NoMatchStrategy,
    rerun_if_unstable: bool,
    pattern: Option<Regex>,
    composite_strategy: CompositePatternStrategy,
    allow_budget_override: bool,
    decision: Arc<dyn ScheduleDecision>,
}

impl ScheduleRequest {
    /// Request allowing `max_schedule` retries (`<= 0` means unlimited)
    pub fn new(max_schedule: i32) -> Self {
        Self {
            max_schedule,
            delay: ScheduleDelay::default(),
            rerun_partial_only: false,
            no_match_strategy: NoMatchStrategy::default(),
            rerun_if_unstable: false,
            pattern: None,
            composite_strategy: CompositePatternStrategy::default(),
            allow_budget_override: false,
            decision: Arc::new(DefaultDecision),
        }
    }

    /// Build a request from its configuration section
    pub fn from_config(config: &RequestConfig) -> Result<Self> {
        let request = Self::new(config.max_schedule)
            .delay(config.delay)
            .rerun_partial_only(config.rerun_partial_only)
            .no_match_strategy(config.no_match_strategy)
            .rerun_if_unstable(config.rerun_if_unstable)
            .composite_strategy(config.composite_pattern_strategy)
            .allow_budget_override(config.allow_budget_override);
        match config.pattern.as_deref() {
            Some(pattern) => request.pattern(pattern),
            None => Ok(request),
        }
    }

    pub fn delay(mut self, delay: ScheduleDelay) -> Self {
        self.delay = delay;
        self
    }

    pub fn rerun_partial_only(mut self, partial: bool) -> Self {
        self.rerun_partial_only = partial;
        self
    }

    pub fn no_match_strategy(mut self, strategy: NoMatchStrategy) -> Self {
        self.no_match_strategy = strategy;
        self
    }

    pub fn rerun_if_unstable(mut self, rerun: bool) -> Self {
        self.rerun_if_unstable = rerun;
        self
    }

    /// Gate retries on `pattern` matching the build log.
    ///
    /// The pattern is compiled here so a bad one is rejected before any build
    /// is evaluated. An empty pattern leaves the gate off.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = if pattern.is_empty() { None } else { Some(Regex::new(pattern)?) };
        Ok(self)
    }

    pub fn composite_strategy(mut self, strategy: CompositePatternStrategy) -> Self {
        self.composite_strategy = strategy;
        self
    }

    /// Let capture group 1 of the matching line replace the retry budget
    pub fn allow_budget_override(mut self, allow: bool) -> Self {
        self.allow_budget_override = allow;
        self
    }

    /// Replace the decision rules
    pub fn decision(mut self, decision: Arc<dyn ScheduleDecision>) -> Self {
        self.decision = decision;
        self
    }

    pub fn max_schedule(&self) -> i32 {
        self.max_schedule
    }

    pub fn schedule_delay(&self) -> &ScheduleDelay {
        &self.delay
    }

    pub fn is_rerun_partial_only(&self) -> bool {
        self.rerun_partial_only
    }

    pub fn get_no_match_strategy(&self) -> NoMatchStrategy {
        self.no_match_strategy
    }

    pub fn is_rerun_if_unstable(&self) -> bool {
        self.rerun_if_unstable
    }

    pub fn gate(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    pub fn get_composite_strategy(&self) -> CompositePatternStrategy {
        self.composite_strategy
    }

    pub fn is_budget_override_allowed(&self) -> bool {
        self.allow_budget_override
    }

    /// Success and Aborted never retry; Unstable only when tolerated
    pub fn passes_threshold(&self, result: BuildResult) -> bool {
        match result {
            BuildResult::Success | BuildResult::Aborted => false,
            BuildResult::Unstable => self.rerun_if_unstable,
            BuildResult::Failure => true,
        }
    }

    /// Returns true if another retry fits in the budget
    pub fn within_budget(&self, retry_count: u32) -> bool {
        fits(self.max_schedule, retry_count)
    }

    /// Budget in effect for `build`.
    ///
    /// With overrides allowed, a budget recorded in the build's marker
    /// outlives the request's own `max_schedule`.
    pub fn budget_for(&self, build: &BuildRecord) -> i32 {
        match build.marker {
            Some(marker) if self.allow_budget_override && marker.max_retry_count != 0 => marker.max_retry_count,
            _ => self.max_schedule,
        }
    }

    /// Like [`within_budget`](Self::within_budget), honoring an override carried by `build`
    pub fn within_budget_for(&self, build: &BuildRecord, retry_count: u32) -> bool {
        fits(self.budget_for(build), retry_count)
    }

    /// Budget carried by a matching scan, when overrides are allowed
    pub fn budget_override(&self, outcome: &ScanOutcome) -> Option<i32> {
        if !self.allow_budget_override {
            return None;
        }
        outcome
            .captured()
            .filter(|&n| n != 0)
            .map(|n| n.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
    }

    /// Whether `build` should be rescheduled under this request
    pub async fn should_schedule(&self, scanner: &LogScanner, build: &BuildRecord, retry_count: u32) -> Decision {
        self.decision.should_schedule(self, scanner, build, retry_count).await
    }

    /// Whether one variant of a composite build belongs in the rerun set
    pub async fn should_schedule_variant(&self, scanner: &LogScanner, variant: &BuildRecord) -> Decision {
        self.decision.should_schedule_variant(self, scanner, variant).await
    }
}

impl Default for ScheduleRequest {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for ScheduleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleRequest")
            .field("max_schedule", &self.max_schedule)
            .field("delay", &self.delay)
            .field("rerun_partial_only", &self.rerun_partial_only)
            .field("no_match_strategy", &self.no_match_strategy)
            .field("rerun_if_unstable", &self.rerun_if_unstable)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("composite_strategy", &self.composite_strategy)
            .field("allow_budget_override", &self.allow_budget_override)
            .finish_non_exhaustive()
    }
}

fn fits(budget: i32, retry_count: u32) -> bool {
    budget <= 0 || i64::from(retry_count) < i64::from(budget)
}
