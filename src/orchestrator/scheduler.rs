//! Outbound contract with the host: submitting a new build.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::{BuildNumber, Cause, RetryMarker};
use crate::error::{Result, RetriggerError};
use crate::rerun::RerunScope;

/// A retry the host is asked to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInvocation {
    pub job: String,

    /// Build being retried
    pub retry_of: BuildNumber,

    /// Seconds to wait before starting
    pub delay_secs: u64,

    /// Earliest start time
    pub not_before: DateTime<Utc>,

    /// Provenance, with exactly one retry cause
    pub causes: Vec<Cause>,

    pub marker: RetryMarker,

    /// Input parameters of the retried build
    pub parameters: BTreeMap<String, String>,

    pub scope: RerunScope,
}

/// Host side of scheduling: queues new builds
#[async_trait]
pub trait BuildScheduler: Send + Sync {
    /// Queue `invocation`. A rejection must be returned, not swallowed.
    async fn submit(&self, invocation: BuildInvocation) -> Result<()>;
}

/// Scheduler that keeps every submission in memory
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    submitted: Mutex<Vec<BuildInvocation>>,
    reject: Option<String>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler that refuses every submission with `reason`
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            reject: Some(reason.into()),
        }
    }

    /// Everything submitted so far, oldest first
    pub fn submitted(&self) -> Vec<BuildInvocation> {
        self.submitted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Remove and return the oldest submission
    pub fn take_next(&self) -> Option<BuildInvocation> {
        let mut submitted = self.submitted.lock().unwrap_or_else(|e| e.into_inner());
        if submitted.is_empty() { None } else { Some(submitted.remove(0)) }
    }
}

#[async_trait]
impl BuildScheduler for RecordingScheduler {
    async fn submit(&self, invocation: BuildInvocation) -> Result<()> {
        if let Some(reason) = &self.reject {
            return Err(RetriggerError::Submission(reason.clone()));
        }
        self.submitted.lock().unwrap_or_else(|e| e.into_inner()).push(invocation);
        Ok(())
    }
}
