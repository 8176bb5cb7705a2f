//! Build records as seen by the retry core
//!
//! A BuildRecord is sealed once its result is fixed. The core only reads it,
//! apart from the marker and causes carried forward into the next attempt.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::cause::Cause;
use crate::domain::marker::RetryMarker;
use crate::error::RetriggerError;

/// Sequential build number within a job
pub type BuildNumber = u64;

/// Terminal result of a build, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    Aborted,
}

impl BuildResult {
    /// Returns true if this result is more severe than `other`
    pub fn is_worse_than(&self, other: BuildResult) -> bool {
        *self > other
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Failure => "FAILURE",
            BuildResult::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// One concrete set of axis values inside a composite build, e.g. `os=linux,jdk=17`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Combination(BTreeMap<String, String>);

impl Combination {
    /// Build a combination from `(axis, value)` pairs
    pub fn new<K, V>(axes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(axes.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Value of a single axis
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.0.get(axis).map(String::as_str)
    }

    pub fn axes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (axis, value) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", axis, value)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Combination {
    type Err = RetriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut axes = BTreeMap::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (axis, value) = part
                .split_once('=')
                .ok_or_else(|| RetriggerError::InvalidConfig(format!("bad combination segment '{}'", part)))?;
            axes.insert(axis.trim().to_string(), value.trim().to_string());
        }
        Ok(Self(axes))
    }
}

/// Where a build's console output can be read from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LogRef {
    /// No log captured
    #[default]
    None,
    /// Log held in memory
    Text { content: String },
    /// Log stored on disk
    File { path: PathBuf },
}

impl LogRef {
    pub fn text(content: impl Into<String>) -> Self {
        LogRef::Text { content: content.into() }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        LogRef::File { path: path.into() }
    }

    /// Open the log as a buffered line source
    pub fn open(&self) -> io::Result<Box<dyn BufRead + Send>> {
        match self {
            LogRef::None => Ok(Box::new(Cursor::new(Vec::new()))),
            LogRef::Text { content } => Ok(Box::new(Cursor::new(content.clone().into_bytes()))),
            LogRef::File { path } => Ok(Box::new(BufReader::new(File::open(path)?))),
        }
    }
}

/// A finished build, or one variant of a composite build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Job this build belongs to; variants share the composite's job
    pub job: String,

    pub number: BuildNumber,

    pub result: BuildResult,

    /// Immediate predecessor in the same job
    pub predecessor: Option<BuildNumber>,

    /// Composite build this record is a variant of
    pub composite: Option<BuildNumber>,

    /// Axis values, set only on variants
    pub combination: Option<Combination>,

    /// Variant runs, set only on composite builds
    #[serde(default)]
    pub variants: Vec<BuildRecord>,

    #[serde(default)]
    pub log: LogRef,

    /// Present when this build was itself scheduled as a retry
    pub marker: Option<RetryMarker>,

    #[serde(default)]
    pub causes: Vec<Cause>,

    /// Input parameters, carried into any retry unchanged
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl BuildRecord {
    /// Create a standalone build record
    pub fn new(job: impl Into<String>, number: BuildNumber, result: BuildResult) -> Self {
        Self {
            job: job.into(),
            number,
            result,
            predecessor: None,
            composite: None,
            combination: None,
            variants: Vec::new(),
            log: LogRef::None,
            marker: None,
            causes: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_predecessor(mut self, number: BuildNumber) -> Self {
        self.predecessor = Some(number);
        self
    }

    pub fn with_log(mut self, log: LogRef) -> Self {
        self.log = log;
        self
    }

    pub fn with_marker(mut self, marker: RetryMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn with_cause(mut self, cause: Cause) -> Self {
        self.causes.push(cause);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Add a variant executed as part of this composite build
    pub fn with_variant(self, combination: Combination, result: BuildResult, log: LogRef) -> Self {
        let number = self.number;
        self.with_variant_from(combination, result, log, number)
    }

    /// Add a variant whose result was carried over from build `ran_in`
    pub fn with_variant_from(
        mut self,
        combination: Combination,
        result: BuildResult,
        log: LogRef,
        ran_in: BuildNumber,
    ) -> Self {
        let mut variant = BuildRecord::new(self.job.clone(), ran_in, result).with_log(log);
        variant.composite = Some(self.number);
        variant.combination = Some(combination);
        self.variants.push(variant);
        self
    }

    pub fn is_composite(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn is_variant(&self) -> bool {
        self.composite.is_some()
    }

    /// Variants actually executed by this attempt, skipping carried-over ones
    pub fn exact_variants(&self) -> impl Iterator<Item = &BuildRecord> {
        self.variants.iter().filter(move |v| v.number == self.number)
    }

    /// Returns true if the host should offer a retry for this build
    pub fn is_retryable(&self) -> bool {
        self.result.is_worse_than(BuildResult::Success)
    }

    /// Human readable label, e.g. `nightly #12` or `nightly #12 [os=linux]`
    pub fn display_name(&self) -> String {
        match &self.combination {
            Some(c) => format!("{} #{} [{}]", self.job, self.number, c),
            None => format!("{} #{}", self.job, self.number),
        }
    }
}
