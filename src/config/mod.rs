//! Configuration for Retrigger.
//!
//! Loaded from .retrigger.yml or ~/.config/retrigger/retrigger.yml. The
//! `request` section describes one [`ScheduleRequest`](crate::decision::ScheduleRequest).

pub use self::global::{RequestConfig, RetriggerConfig, ScanConfig};

mod global;
