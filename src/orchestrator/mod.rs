//! Retry scheduling entry point.
//!
//! The host calls [`Orchestrator::on_completed`] once per finished build.
//! Variants of a composite build are skipped; their composite is evaluated
//! as a whole once it completes. For every attached request that says yes,
//! exactly one new build is submitted.

pub mod scheduler;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::decision::ScheduleRequest;
use crate::domain::{BuildNumber, BuildRecord, Cause, RetryMarker, rewrite_causes};
use crate::error::{Result, RetriggerError};
use crate::history::{BuildHistory, resolve_retry_count};
use crate::rerun::{RerunScope, plan_rerun};
use crate::scan::LogScanner;
pub use scheduler::{BuildInvocation, BuildScheduler, RecordingScheduler};

/// What a completion check ended with
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// Build is a variant; its composite decides
    Deferred,
    /// No request asked for a retry
    NotRescheduled,
    /// One invocation per request that asked for a retry
    Rescheduled(Vec<BuildInvocation>),
}

impl CompletionOutcome {
    pub fn invocations(&self) -> &[BuildInvocation] {
        match self {
            CompletionOutcome::Rescheduled(invocations) => invocations,
            _ => &[],
        }
    }

    pub fn is_rescheduled(&self) -> bool {
        matches!(self, CompletionOutcome::Rescheduled(_))
    }
}

/// Composes retry-count resolution, decisions, rerun planning and submission
pub struct Orchestrator {
    history: Arc<dyn BuildHistory>,
    scheduler: Arc<dyn BuildScheduler>,
    scanner: LogScanner,
}

impl Orchestrator {
    pub fn new(history: Arc<dyn BuildHistory>, scheduler: Arc<dyn BuildScheduler>) -> Self {
        Self {
            history,
            scheduler,
            scanner: LogScanner::default(),
        }
    }

    /// Use `scanner` for log gates instead of the 30s default
    pub fn with_scanner(mut self, scanner: LogScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn scanner(&self) -> &LogScanner {
        &self.scanner
    }

    /// Completion check for `build` against each attached request.
    ///
    /// A submission failure is returned immediately. Invocations already
    /// submitted for earlier requests stay submitted.
    pub async fn on_completed(&self, build: &BuildRecord, requests: &[ScheduleRequest]) -> Result<CompletionOutcome> {
        if build.is_variant() {
            debug!("{} is a variant, waiting for its composite", build.display_name());
            return Ok(CompletionOutcome::Deferred);
        }

        let retry_count = resolve_retry_count(build, self.history.as_ref());
        let mut invocations = Vec::new();

        for request in requests {
            let decision = request.should_schedule(&self.scanner, build, retry_count).await;
            if !decision.schedule {
                continue;
            }

            let Some(plan) = plan_rerun(request, &self.scanner, build).await else {
                continue;
            };

            let delay = request.schedule_delay().compute_delay(retry_count);
            info!(
                "About to schedule a retry of {} in {} seconds (retry {})",
                build.display_name(),
                delay,
                retry_count + 1
            );

            let budget = plan
                .budget_override
                .or(decision.budget_override)
                .unwrap_or_else(|| request.budget_for(build));
            let marker = RetryMarker::new(retry_count + 1, budget, Some(build.number));
            let invocation = self.invocation(build, delay, marker, Cause::retry_of(build), plan.scope);
            self.scheduler.submit(invocation.clone()).await?;
            invocations.push(invocation);
        }

        if invocations.is_empty() {
            Ok(CompletionOutcome::NotRescheduled)
        } else {
            Ok(CompletionOutcome::Rescheduled(invocations))
        }
    }

    /// Completion check for a build looked up in history
    pub async fn on_completed_by_number(
        &self,
        job: &str,
        number: BuildNumber,
        requests: &[ScheduleRequest],
    ) -> Result<CompletionOutcome> {
        let build = self
            .history
            .build(job, number)
            .ok_or_else(|| RetriggerError::BuildNotFound(format!("{} #{}", job, number)))?;
        self.on_completed(&build, requests).await
    }

    /// Retry `build` right away on behalf of `actor`, rerunning everything
    pub async fn force_retry(&self, build: &BuildRecord, actor: &str) -> Result<BuildInvocation> {
        if !build.is_retryable() {
            return Err(RetriggerError::NotRetryable(format!(
                "{} finished {}",
                build.display_name(),
                build.result
            )));
        }
        let retry_count = resolve_retry_count(build, self.history.as_ref());
        // budget unknown for manual retries
        let marker = RetryMarker::new(retry_count + 1, 0, Some(build.number));
        let invocation = self.invocation(build, 0, marker, Cause::forced_by(actor, build), RerunScope::Whole);
        info!("{} requested a retry of {}", actor, build.display_name());
        self.scheduler.submit(invocation.clone()).await?;
        Ok(invocation)
    }

    fn invocation(
        &self,
        build: &BuildRecord,
        delay_secs: u64,
        marker: RetryMarker,
        provenance: Cause,
        scope: RerunScope,
    ) -> BuildInvocation {
        BuildInvocation {
            job: build.job.clone(),
            retry_of: build.number,
            delay_secs,
            not_before: start_after(Utc::now(), delay_secs),
            causes: rewrite_causes(&build.causes, provenance),
            marker,
            parameters: build.parameters.clone(),
            scope,
        }
    }
}

fn start_after(now: DateTime<Utc>, delay_secs: u64) -> DateTime<Utc> {
    i64::try_from(delay_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
