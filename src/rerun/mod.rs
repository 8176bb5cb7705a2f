//! Partial reruns of composite builds.
//!
//! Once a composite build is cleared for a retry, each variant executed by
//! that attempt is tested on its own and the survivors form the rerun set.
//! An empty set falls back to the request's [`NoMatchStrategy`].

use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::decision::{NoMatchStrategy, ScheduleRequest};
use crate::domain::{BuildRecord, Combination};
use crate::scan::LogScanner;

/// Variants a composite retry must execute again
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRerunSet(BTreeSet<Combination>);

impl VariantRerunSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, combination: Combination) -> bool {
        self.0.insert(combination)
    }

    /// Called by the host's composite scheduler for each variant it could run
    pub fn needs_rerun(&self, combination: &Combination) -> bool {
        self.0.contains(combination)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Combination> {
        self.0.iter()
    }
}

impl FromIterator<Combination> for VariantRerunSet {
    fn from_iter<I: IntoIterator<Item = Combination>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What a retry will execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "variants", rename_all = "lowercase")]
pub enum RerunScope {
    /// Everything, as in the original build
    Whole,
    /// Only the listed variants; an empty set runs none
    Partial(VariantRerunSet),
}

impl RerunScope {
    /// Returns true if the host should execute `combination`
    pub fn includes(&self, combination: &Combination) -> bool {
        match self {
            RerunScope::Whole => true,
            RerunScope::Partial(set) => set.needs_rerun(combination),
        }
    }
}

/// Work chosen for one retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerunPlan {
    pub scope: RerunScope,
    /// Retry budget read from a selected variant's log; the last one wins
    pub budget_override: Option<i32>,
}

impl RerunPlan {
    fn whole() -> Self {
        Self {
            scope: RerunScope::Whole,
            budget_override: None,
        }
    }
}

/// Work for a build already cleared for retry; `None` means skip this request.
pub async fn plan_rerun(request: &ScheduleRequest, scanner: &LogScanner, build: &BuildRecord) -> Option<RerunPlan> {
    if !(request.is_rerun_partial_only() && build.is_composite()) {
        return Some(RerunPlan::whole());
    }

    let mut set = VariantRerunSet::new();
    let mut budget_override = None;
    for variant in build.exact_variants() {
        let decision = request.should_schedule_variant(scanner, variant).await;
        if !decision.schedule {
            continue;
        }
        if let Some(combination) = &variant.combination {
            debug!("Add variant {} to rerun of {}", combination, build.display_name());
            set.insert(combination.clone());
            budget_override = decision.budget_override.or(budget_override);
        }
    }
    if !set.is_empty() {
        return Some(RerunPlan {
            scope: RerunScope::Partial(set),
            budget_override,
        });
    }

    match request.get_no_match_strategy() {
        NoMatchStrategy::RerunWhole => Some(RerunPlan::whole()),
        NoMatchStrategy::RerunEmpty => Some(RerunPlan {
            scope: RerunScope::Partial(VariantRerunSet::new()),
            budget_override: None,
        }),
        NoMatchStrategy::DontRun => {
            debug!("No variant of {} to rerun, skipping", build.display_name());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::CompositePatternStrategy;
    use crate::domain::{BuildResult, LogRef};

    fn combo(x: &str, y: &str) -> Combination {
        Combination::new([("x", x), ("y", y)])
    }

    fn grid(failing: &[(&str, &str)], logs: &[(&str, &str, &str)]) -> BuildRecord {
        let mut build = BuildRecord::new("matrix", 2, BuildResult::Failure);
        for x in ["1", "2"] {
            for y in ["1", "2"] {
                let result = if failing.contains(&(x, y)) {
                    BuildResult::Failure
                } else {
                    BuildResult::Success
                };
                let log = logs
                    .iter()
                    .find(|(lx, ly, _)| *lx == x && *ly == y)
                    .map(|(_, _, l)| LogRef::text(*l))
                    .unwrap_or_default();
                build = build.with_variant(combo(x, y), result, log);
            }
        }
        build
    }

    async fn plan(request: &ScheduleRequest, build: &BuildRecord) -> Option<RerunScope> {
        plan_rerun(request, &LogScanner::default(), build).await.map(|p| p.scope)
    }

    #[test]
    fn test_rerun_set_membership() {
        let set: VariantRerunSet = [combo("1", "2")].into_iter().collect();
        assert!(set.needs_rerun(&combo("1", "2")));
        assert!(!set.needs_rerun(&combo("2", "2")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_scope_includes() {
        assert!(RerunScope::Whole.includes(&combo("1", "1")));
        assert!(!RerunScope::Partial(VariantRerunSet::new()).includes(&combo("1", "1")));
    }

    #[tokio::test]
    async fn test_whole_when_partial_disabled() {
        let build = grid(&[("1", "2")], &[]);
        assert_eq!(plan(&ScheduleRequest::new(0), &build).await, Some(RerunScope::Whole));
    }

    #[tokio::test]
    async fn test_whole_for_standalone_build() {
        let build = BuildRecord::new("job", 1, BuildResult::Failure);
        let request = ScheduleRequest::new(0).rerun_partial_only(true);
        assert_eq!(plan(&request, &build).await, Some(RerunScope::Whole));
    }

    #[tokio::test]
    async fn test_only_failing_variants() {
        let build = grid(&[("1", "2"), ("2", "1")], &[]);
        let request = ScheduleRequest::new(0).rerun_partial_only(true);
        let expected: VariantRerunSet = [combo("1", "2"), combo("2", "1")].into_iter().collect();
        assert_eq!(plan(&request, &build).await, Some(RerunScope::Partial(expected)));
    }

    #[tokio::test]
    async fn test_retrigger_matched_keeps_matching_failures_only() {
        let build = grid(
            &[("1", "1"), ("1", "2"), ("2", "2")],
            &[("1", "1", "socket timeout"), ("1", "2", "test failed"), ("2", "1", "socket timeout")],
        );
        let request = ScheduleRequest::new(0)
            .rerun_partial_only(true)
            .pattern("socket timeout")
            .unwrap()
            .composite_strategy(CompositePatternStrategy::TestChildrenRetriggerMatched);
        let expected: VariantRerunSet = [combo("1", "1")].into_iter().collect();
        assert_eq!(plan(&request, &build).await, Some(RerunScope::Partial(expected)));
    }

    #[tokio::test]
    async fn test_retrigger_all_keeps_every_failure() {
        let build = grid(&[("1", "1"), ("1", "2")], &[("1", "1", "socket timeout")]);
        let request = ScheduleRequest::new(0)
            .rerun_partial_only(true)
            .pattern("socket timeout")
            .unwrap()
            .composite_strategy(CompositePatternStrategy::TestChildrenRetriggerAll);
        let expected: VariantRerunSet = [combo("1", "1"), combo("1", "2")].into_iter().collect();
        assert_eq!(plan(&request, &build).await, Some(RerunScope::Partial(expected)));
    }

    #[tokio::test]
    async fn test_carried_over_variants_ignored() {
        let build = BuildRecord::new("matrix", 5, BuildResult::Failure)
            .with_variant(combo("1", "1"), BuildResult::Failure, LogRef::None)
            .with_variant_from(combo("1", "2"), BuildResult::Failure, LogRef::None, 4);
        let request = ScheduleRequest::new(0).rerun_partial_only(true);
        let expected: VariantRerunSet = [combo("1", "1")].into_iter().collect();
        assert_eq!(plan(&request, &build).await, Some(RerunScope::Partial(expected)));
    }

    #[tokio::test]
    async fn test_no_match_strategies() {
        let build = grid(&[("1", "1")], &[("1", "1", "compile error")]);
        let base = ScheduleRequest::new(0)
            .rerun_partial_only(true)
            .pattern("socket timeout")
            .unwrap()
            .composite_strategy(CompositePatternStrategy::TestChildrenRetriggerMatched);

        let whole = base.clone().no_match_strategy(NoMatchStrategy::RerunWhole);
        assert_eq!(plan(&whole, &build).await, Some(RerunScope::Whole));

        let empty = base.clone().no_match_strategy(NoMatchStrategy::RerunEmpty);
        assert_eq!(plan(&empty, &build).await, Some(RerunScope::Partial(VariantRerunSet::new())));

        let dont = base.no_match_strategy(NoMatchStrategy::DontRun);
        assert_eq!(plan(&dont, &build).await, None);
    }

    #[tokio::test]
    async fn test_variant_budget_override_carried_in_plan() {
        let build = grid(
            &[("1", "1"), ("2", "2")],
            &[("1", "1", "allow retries: 4"), ("2", "2", "allow retries: 6")],
        );
        let request = ScheduleRequest::new(1)
            .rerun_partial_only(true)
            .pattern(r"allow retries: (\d+)")
            .unwrap()
            .allow_budget_override(true)
            .composite_strategy(CompositePatternStrategy::TestChildrenRetriggerMatched);
        let plan = plan_rerun(&request, &LogScanner::default(), &build).await.unwrap();
        assert_eq!(plan.budget_override, Some(6));
        assert_eq!(plan.scope, RerunScope::Partial([combo("1", "1"), combo("2", "2")].into_iter().collect()));

        let whole = plan_rerun(&ScheduleRequest::new(1), &LogScanner::default(), &build).await.unwrap();
        assert_eq!(whole.budget_override, None);
    }

    #[test]
    fn test_scope_serde() {
        let json = serde_json::to_string(&RerunScope::Whole).unwrap();
        assert_eq!(json, r#"{"scope":"whole"}"#);
    }
}
