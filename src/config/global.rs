//! Global configuration.
//!
//! Loaded from .retrigger.yml or ~/.config/retrigger/retrigger.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::decision::{CompositePatternStrategy, NoMatchStrategy, ScheduleRequest};
use crate::delay::ScheduleDelay;
use crate::scan::{DEFAULT_SCAN_TIMEOUT_MS, LogScanner};

/// Global configuration for Retrigger.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RetriggerConfig {
    /// Log scanning limits.
    pub scan: ScanConfig,

    /// Retry request applied to completed builds.
    pub request: RequestConfig,
}

impl RetriggerConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .retrigger.yml in current directory
    /// 3. ~/.config/retrigger/retrigger.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".retrigger.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .retrigger.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .retrigger.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("retrigger").join("retrigger.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scan.timeout_ms == 0 {
            eyre::bail!("scan.timeout-ms must be > 0");
        }
        if let Some(pattern) = &self.request.pattern {
            regex::Regex::new(pattern).context("request.pattern is not a valid regex")?;
        }
        Ok(())
    }

    /// Scanner honoring `scan.timeout-ms`
    pub fn scanner(&self) -> Result<LogScanner> {
        LogScanner::new(self.scan.timeout_ms).context("Failed to build log scanner")
    }

    /// Request described by the `request` section
    pub fn schedule_request(&self) -> Result<ScheduleRequest> {
        ScheduleRequest::from_config(&self.request).context("Failed to build schedule request")
    }
}

/// Log scanning limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Upper bound on a single log scan in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
        }
    }
}

/// One retry request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RequestConfig {
    /// Retry budget; zero or negative is unlimited.
    pub max_schedule: i32,

    pub delay: ScheduleDelay,

    /// Retry unstable builds too.
    pub rerun_if_unstable: bool,

    /// Rerun only the failing variants of a composite build.
    pub rerun_partial_only: bool,

    pub no_match_strategy: NoMatchStrategy,

    /// Log gate; unset or empty disables it.
    pub pattern: Option<String>,

    pub composite_pattern_strategy: CompositePatternStrategy,

    /// Let the gate's first capture group replace `max-schedule`.
    pub allow_budget_override: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RetriggerConfig::default();
        assert_eq!(config.scan.timeout_ms, 30_000);
        assert_eq!(config.request.max_schedule, 0);
        assert_eq!(config.request.delay, ScheduleDelay::default());
        assert!(config.request.pattern.is_none());
    }

    #[test]
    fn test_config_validation() {
        let config = RetriggerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = RetriggerConfig {
            scan: ScanConfig { timeout_ms: 0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RetriggerConfig {
            request: RequestConfig {
                pattern: Some("(unclosed".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
scan:
  timeout-ms: 5000
request:
  max-schedule: 3
  delay:
    kind: fixed
    delay: 60
  rerun-partial-only: true
  no-match-strategy: dont-run
  pattern: "Connection (refused|reset)"
  composite-pattern-strategy: test-children-retrigger-matched
"#;
        let config: RetriggerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scan.timeout_ms, 5000);
        assert_eq!(config.request.max_schedule, 3);
        assert_eq!(config.request.delay, ScheduleDelay::fixed(60));
        assert!(config.request.rerun_partial_only);
        assert_eq!(config.request.no_match_strategy, NoMatchStrategy::DontRun);
        assert_eq!(
            config.request.composite_pattern_strategy,
            CompositePatternStrategy::TestChildrenRetriggerMatched
        );
        // Other fields should have defaults
        assert!(!config.request.rerun_if_unstable);
        assert!(!config.request.allow_budget_override);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request:\n  max-schedule: 2\n  rerun-if-unstable: true").unwrap();
        let path = file.path().to_path_buf();

        let config = RetriggerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.request.max_schedule, 2);
        let request = config.schedule_request().unwrap();
        assert!(request.is_rerun_if_unstable());
        assert_eq!(config.scanner().unwrap().timeout().as_millis(), 30_000);
    }

    #[test]
    fn test_load_rejects_zero_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scan:\n  timeout-ms: 0").unwrap();
        let path = file.path().to_path_buf();
        assert!(RetriggerConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/retrigger.yml");
        assert!(RetriggerConfig::load(Some(&path)).is_err());
    }
}
