//! Reader wrapper that aborts as soon as a scan is cancelled.

use std::io::{self, BufRead, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag a scan worker polls on every buffer access
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Error a worker bails out with once cancelled
    pub fn check(&self) -> io::Result<()> {
        if self.is_cancelled() {
            // not Interrupted: BufRead helpers retry on that kind
            Err(io::Error::other("log scan cancelled"))
        } else {
            Ok(())
        }
    }
}

/// Wraps a log source so every read checks the cancel flag first
pub struct CancellableReader<R> {
    inner: R,
    cancel: CancelFlag,
}

impl<R> CancellableReader<R> {
    pub fn new(inner: R, cancel: CancelFlag) -> Self {
        Self { inner, cancel }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cancel.check()?;
        self.inner.read(buf)
    }
}

impl<R: BufRead> BufRead for CancellableReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.cancel.check()?;
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}
