//! Delay policies for rescheduled builds.
//!
//! Every policy is a plain value: the wait depends only on the retry count
//! of the failed build (0 for a first-time failure).
//!
//! - Fixed: the same delay every time
//! - Progressive: triangular backoff, `increment * (n+1)(n+2)/2`
//! - Exponential: `base^n`
//!
//! Progressive and Exponential are capped at `max` when `max > 0`.

use serde::{Deserialize, Serialize};

/// Default progressive increment: 5 minutes.
pub const DEFAULT_INCREMENT_SECS: u64 = 5 * 60;
/// Default progressive cap: 3 hours.
pub const DEFAULT_MAX_SECS: i64 = 3 * 60 * 60;

/// How long to wait before a retry is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScheduleDelay {
    /// Constant delay in seconds
    Fixed { delay: u64 },
    /// Triangular backoff, `max <= 0` disables the cap
    Progressive { increment: u64, max: i64 },
    /// Exponential backoff, `max <= 0` disables the cap
    Exponential { base: u64, max: i64 },
}

impl ScheduleDelay {
    pub fn fixed(delay: u64) -> Self {
        ScheduleDelay::Fixed { delay }
    }

    pub fn progressive(increment: u64, max: i64) -> Self {
        ScheduleDelay::Progressive { increment, max }
    }

    pub fn exponential(base: u64, max: i64) -> Self {
        ScheduleDelay::Exponential { base, max }
    }

    /// Seconds to wait before retrying a build whose lineage has used `retry_count` retries
    pub fn compute_delay(&self, retry_count: u32) -> u64 {
        match *self {
            ScheduleDelay::Fixed { delay } => delay,
            ScheduleDelay::Progressive { increment, max } => {
                let n = u64::from(retry_count);
                let steps = (n + 1).saturating_mul(n + 2) / 2;
                cap(increment.saturating_mul(steps), max)
            }
            ScheduleDelay::Exponential { base, max } => cap(base.saturating_pow(retry_count), max),
        }
    }

    /// Name shown to operators
    pub fn display_name(&self) -> &'static str {
        match self {
            ScheduleDelay::Fixed { .. } => "Fixed",
            ScheduleDelay::Progressive { .. } => "Progressively introduce delay until the next build",
            ScheduleDelay::Exponential { .. } => "Exponential",
        }
    }
}

impl Default for ScheduleDelay {
    fn default() -> Self {
        ScheduleDelay::progressive(DEFAULT_INCREMENT_SECS, DEFAULT_MAX_SECS)
    }
}

fn cap(delay: u64, max: i64) -> u64 {
    if max > 0 { delay.min(max as u64) } else { delay }
}
