//! Clock abstraction.
//!
//! Mining's 10-20s timing band and the 180s block-maturity gate are both
//! specified against wall-clock time. Production code uses [`SystemClock`];
//! tests that need to fast-forward past the maturity gate without an actual
//! 180s sleep substitute [`TestClock`]. `TestClock` is left unconditionally
//! `pub` (not `#[cfg(test)]`) so it is usable from this crate's own
//! integration tests under `core/tests/`, which link against the normally
//! compiled rlib rather than a `cfg(test)` build.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as i64
    }
}

#[derive(Debug, Clone)]
pub struct TestClock {
    millis: std::sync::Arc<std::sync::atomic::AtomicI64>,
}

impl TestClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: std::sync::Arc::new(std::sync::atomic::AtomicI64::new(start_millis)),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.millis
            .fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(std::sync::atomic::Ordering::SeqCst)
    }
}
