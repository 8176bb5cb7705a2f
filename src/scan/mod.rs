//! Time-bounded log pattern scanning.
//!
//! A scan reads the log line by line on a blocking worker and stops at the
//! first line the pattern matches. Lines longer than [`SCAN_WINDOW_BYTES`]
//! are searched in overlapping windows; memory stays bounded by one window.
//! The caller waits at most the configured timeout. On timeout the worker is
//! cancelled and joined before `scan` returns, and the outcome counts as
//! "no match".

pub mod reader;

use std::io::BufRead;
use std::time::Duration;

use log::{debug, warn};
use regex::Regex;

use crate::domain::LogRef;
use crate::error::{Result, RetriggerError};
pub use reader::{CancelFlag, CancellableReader};

/// Default scan timeout: 30 seconds.
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 30_000;

/// Largest slice of a line handed to the regex in one call.
///
/// Longer lines are searched window by window, with the cancel flag checked
/// in between, so a cancelled scan stops within one window's work.
pub const SCAN_WINDOW_BYTES: usize = 4 * 1024;

/// Tail of a window repeated at the start of the next one, so matches up to
/// this length survive a window boundary.
pub const SCAN_WINDOW_OVERLAP: usize = 512;

/// Result of scanning one log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A line matched; `captured` is capture group 1 parsed as an integer
    Matched { text: String, captured: Option<i64> },
    /// The whole log was read without a match
    NoMatch,
    /// The scan ran past its timeout and was cancelled
    TimedOut,
    /// The log could not be read
    Failed(String),
}

impl ScanOutcome {
    /// Only a real match counts; timeouts and read failures do not
    pub fn is_match(&self) -> bool {
        matches!(self, ScanOutcome::Matched { .. })
    }

    /// Integer extracted from the matching line, if any
    pub fn captured(&self) -> Option<i64> {
        match self {
            ScanOutcome::Matched { captured, .. } => *captured,
            _ => None,
        }
    }
}

/// Runs log scans under a wall-clock budget
#[derive(Debug, Clone)]
pub struct LogScanner {
    timeout: Duration,
}

impl Default for LogScanner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_SCAN_TIMEOUT_MS),
        }
    }
}

impl LogScanner {
    /// Create a scanner; a zero timeout is rejected
    pub fn new(timeout_ms: u64) -> Result<Self> {
        if timeout_ms == 0 {
            return Err(RetriggerError::InvalidConfig("scan timeout must be > 0".to_string()));
        }
        Ok(Self {
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Scan a build log for `pattern`
    pub async fn scan(&self, log: &LogRef, pattern: &Regex) -> ScanOutcome {
        match log.open() {
            Ok(reader) => self.scan_reader(reader, pattern).await,
            Err(e) => {
                warn!("Could not open log for pattern '{}': {}", pattern, e);
                ScanOutcome::Failed(e.to_string())
            }
        }
    }

    /// Scan an arbitrary line source for `pattern`
    pub async fn scan_reader(&self, reader: Box<dyn BufRead + Send>, pattern: &Regex) -> ScanOutcome {
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();
        let worker_pattern = pattern.clone();

        let mut worker = tokio::task::spawn_blocking(move || {
            let reader = CancellableReader::new(reader, worker_cancel.clone());
            scan_lines(reader, &worker_pattern, &worker_cancel)
        });

        let waited = tokio::time::timeout(self.timeout, &mut worker).await;
        match waited {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                warn!("Error while reading log for pattern '{}': {}", pattern, e);
                ScanOutcome::Failed(e.to_string())
            }
            Ok(Err(e)) => {
                warn!("Aborted pattern '{}': {}", pattern, e);
                ScanOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    "Aborted pattern '{}' for too long execution time (> {} ms)",
                    pattern,
                    self.timeout.as_millis()
                );
                cancel.cancel();
                // join: the worker must not outlive the scan
                let _ = worker.await;
                ScanOutcome::TimedOut
            }
        }
    }
}

fn scan_lines<R: BufRead>(mut reader: R, pattern: &Regex, cancel: &CancelFlag) -> std::io::Result<ScanOutcome> {
    let mut line: Vec<u8> = Vec::with_capacity(SCAN_WINDOW_BYTES);
    loop {
        cancel.check()?;
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            if line.is_empty() {
                return Ok(ScanOutcome::NoMatch);
            }
            return Ok(search(&line, pattern).unwrap_or(ScanOutcome::NoMatch));
        }

        let take = chunk.len().min(SCAN_WINDOW_BYTES - line.len());
        match chunk[..take].iter().position(|&b| b == b'\n') {
            Some(end) => {
                line.extend_from_slice(&chunk[..end]);
                reader.consume(end + 1);
                if let Some(outcome) = search(&line, pattern) {
                    return Ok(outcome);
                }
                line.clear();
            }
            None => {
                line.extend_from_slice(&chunk[..take]);
                reader.consume(take);
                if line.len() == SCAN_WINDOW_BYTES {
                    if let Some(outcome) = search(&line, pattern) {
                        return Ok(outcome);
                    }
                    line.drain(..SCAN_WINDOW_BYTES - SCAN_WINDOW_OVERLAP);
                }
            }
        }
    }
}

fn search(bytes: &[u8], pattern: &Regex) -> Option<ScanOutcome> {
    let text = String::from_utf8_lossy(bytes);
    let caps = pattern.captures(text.trim_end_matches('\r'))?;
    let matched = caps.get(0).map(|m| m.as_str()).unwrap_or_default().to_string();
    let captured = caps.get(1).and_then(|m| m.as_str().trim().parse::<i64>().ok());
    debug!("Found log message: {}", matched);
    Some(ScanOutcome::Matched {
        text: matched,
        captured,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Read, Write};
    use std::time::Instant;

    /// Endless log that trickles out one line per read
    struct TrickleLog {
        delay: Duration,
    }

    impl Read for TrickleLog {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(self.delay);
            let line = b"still compiling\n";
            let n = line.len().min(buf.len());
            buf[..n].copy_from_slice(&line[..n]);
            Ok(n)
        }
    }

    fn pattern(p: &str) -> Regex {
        Regex::new(p).unwrap()
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(LogScanner::new(0), Err(RetriggerError::InvalidConfig(_))));
    }

    #[test]
    fn test_default_timeout() {
        assert_eq!(LogScanner::default().timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_outcome_helpers() {
        let matched = ScanOutcome::Matched {
            text: "x".to_string(),
            captured: Some(3),
        };
        assert!(matched.is_match());
        assert_eq!(matched.captured(), Some(3));
        assert!(!ScanOutcome::TimedOut.is_match());
        assert!(!ScanOutcome::Failed("io".to_string()).is_match());
        assert_eq!(ScanOutcome::NoMatch.captured(), None);
    }

    #[tokio::test]
    async fn test_scan_text_match() {
        let scanner = LogScanner::default();
        let log = LogRef::text("Compiling\nerror: connection reset by peer\nDone");
        let outcome = scanner.scan(&log, &pattern("connection reset")).await;
        assert_eq!(
            outcome,
            ScanOutcome::Matched {
                text: "connection reset".to_string(),
                captured: None
            }
        );
    }

    #[tokio::test]
    async fn test_scan_text_no_match() {
        let scanner = LogScanner::default();
        let log = LogRef::text("Compiling\nDone");
        assert_eq!(scanner.scan(&log, &pattern("segfault")).await, ScanOutcome::NoMatch);
    }

    #[tokio::test]
    async fn test_scan_is_line_oriented() {
        let scanner = LogScanner::default();
        let log = LogRef::text("foo\nbar");
        assert!(!scanner.scan(&log, &pattern("foo.bar")).await.is_match());
        assert!(scanner.scan(&log, &pattern("^bar$")).await.is_match());
    }

    #[tokio::test]
    async fn test_scan_extracts_capture_group() {
        let scanner = LogScanner::default();
        let log = LogRef::text("retry budget: 7\n");
        let outcome = scanner.scan(&log, &pattern(r"retry budget: (\d+)")).await;
        assert_eq!(outcome.captured(), Some(7));
    }

    #[tokio::test]
    async fn test_scan_non_numeric_capture() {
        let scanner = LogScanner::default();
        let log = LogRef::text("flaky test: net_io\n");
        let outcome = scanner.scan(&log, &pattern(r"flaky test: (\w+)")).await;
        assert!(outcome.is_match());
        assert_eq!(outcome.captured(), None);
    }

    #[tokio::test]
    async fn test_scan_file_log() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "step 1").unwrap();
        writeln!(file, "FATAL: agent went offline").unwrap();
        let scanner = LogScanner::default();
        let outcome = scanner.scan(&LogRef::file(file.path()), &pattern("agent went offline")).await;
        assert!(outcome.is_match());
    }

    #[tokio::test]
    async fn test_scan_crlf_line_endings() {
        let scanner = LogScanner::default();
        let log = LogRef::text("flaky\r\nok\r\n");
        assert!(scanner.scan(&log, &pattern("^flaky$")).await.is_match());
    }

    #[tokio::test]
    async fn test_scan_invalid_utf8_is_lossy() {
        let scanner = LogScanner::default();
        let bytes: Vec<u8> = vec![0xff, 0xfe, b' ', b'o', b'o', b'm', b'\n'];
        let outcome = scanner
            .scan_reader(Box::new(std::io::Cursor::new(bytes)), &pattern("oom"))
            .await;
        assert!(outcome.is_match());
    }

    #[tokio::test]
    async fn test_missing_log_is_failure_not_match() {
        let scanner = LogScanner::default();
        let outcome = scanner.scan(&LogRef::file("/no/such/build.log"), &pattern(".*")).await;
        assert!(matches!(outcome, ScanOutcome::Failed(_)));
        assert!(!outcome.is_match());
    }

    #[tokio::test]
    async fn test_scan_times_out_and_joins_worker() {
        let scanner = LogScanner::new(200).unwrap();
        let log = BufReader::new(TrickleLog {
            delay: Duration::from_millis(20),
        });
        let started = Instant::now();
        let outcome = scanner.scan_reader(Box::new(log), &pattern("never printed")).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, ScanOutcome::TimedOut);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2), "scan took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_long_line_match_beyond_first_window() {
        let scanner = LogScanner::default();
        let line = format!("{}exit code 137", "x".repeat(SCAN_WINDOW_BYTES * 3));
        let outcome = scanner.scan(&LogRef::text(line), &pattern(r"exit code (\d+)")).await;
        assert_eq!(outcome.captured(), Some(137));
    }

    #[tokio::test]
    async fn test_match_across_window_boundary() {
        let scanner = LogScanner::default();
        let line = format!("{}needle{}", "x".repeat(SCAN_WINDOW_BYTES - 3), "y".repeat(100));
        assert!(scanner.scan(&LogRef::text(line), &pattern("needle")).await.is_match());
    }

    #[tokio::test]
    async fn test_long_line_without_newline_at_eof() {
        let scanner = LogScanner::default();
        let log = LogRef::text(format!("{}tail", "z".repeat(SCAN_WINDOW_BYTES + 100)));
        assert!(scanner.scan(&log, &pattern("tail$")).await.is_match());
        assert!(!scanner.scan(&log, &pattern("absent")).await.is_match());
    }

    #[tokio::test]
    async fn test_slow_match_on_single_long_line_times_out() {
        let scanner = LogScanner::new(500).unwrap();
        let log = LogRef::text("é ".repeat(4_000_000));
        let started = Instant::now();
        let outcome = scanner.scan(&log, &pattern(r"(?:\b\w+\b\s*){40}Z")).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, ScanOutcome::TimedOut);
        assert!(elapsed < Duration::from_secs(2), "scan took {:?}", elapsed);
    }
}
