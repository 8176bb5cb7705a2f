//! Build causes and the provenance rewriting applied to retries.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::build::{BuildNumber, BuildRecord};

/// Why a build was started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Cause {
    /// Started by a user
    User { user: String },
    /// Started by the completion of another build
    Upstream { job: String, build: BuildNumber },
    /// Started by a timer trigger
    Timer,
    /// Started by a source change
    Scm,
    /// Scheduled automatically as a retry of a failed build
    Retry { job: String, build: BuildNumber },
    /// Retry forced by someone through the host
    RetryActor { actor: String, job: String, build: BuildNumber },
}

impl Cause {
    /// Automatic provenance for a retry of `build`
    pub fn retry_of(build: &BuildRecord) -> Self {
        Cause::Retry {
            job: build.job.clone(),
            build: build.number,
        }
    }

    /// Provenance for a retry of `build` forced by `actor`
    pub fn forced_by(actor: impl Into<String>, build: &BuildRecord) -> Self {
        Cause::RetryActor {
            actor: actor.into(),
            job: build.job.clone(),
            build: build.number,
        }
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Cause::Retry { .. } | Cause::RetryActor { .. })
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::User { user } => write!(f, "Started by user {}", user),
            Cause::Upstream { job, build } => write!(f, "Started by upstream project {} #{}", job, build),
            Cause::Timer => f.write_str("Started by timer"),
            Cause::Scm => f.write_str("Started by an SCM change"),
            Cause::Retry { job, build } => write!(f, "Started by retry of {} #{}", job, build),
            Cause::RetryActor { actor, job, build } => {
                write!(f, "Retry of {} #{} requested by {}", job, build, actor)
            }
        }
    }
}

/// Cause list for the next attempt.
///
/// Drops every earlier retry cause so exactly one retry provenance remains.
/// A forced retry also replaces "started by user" causes with its actor.
/// Order is kept and exact duplicates collapse.
pub fn rewrite_causes(previous: &[Cause], provenance: Cause) -> Vec<Cause> {
    let forced = matches!(provenance, Cause::RetryActor { .. });
    let mut causes: Vec<Cause> = Vec::with_capacity(previous.len() + 1);
    for cause in previous {
        if cause.is_retry() || (forced && matches!(cause, Cause::User { .. })) {
            continue;
        }
        if !causes.contains(cause) {
            causes.push(cause.clone());
        }
    }
    causes.push(provenance);
    causes
}
