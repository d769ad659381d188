//! Upload counters readable from any thread without blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct UploadStats {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl UploadStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished upload that took `elapsed`.
    pub fn add_upload(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total_upload_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    /// `(count, total time)` read back to back.
    pub fn snapshot(&self) -> (u64, Duration) {
        (self.upload_count(), self.total_upload_time())
    }
}
