//! Shared health state for the /health endpoint.
//! Updated by DigestRunner, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// True while a digest is being fetched and scored.
    pub digest_running: AtomicBool,
    /// Nanosecond timestamp of the last completed digest (0 = none).
    pub last_digest_at_ns: AtomicU64,
    /// Sources that failed in the last digest.
    pub last_failed_sources: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_digest_running(&self, v: bool) {
        self.digest_running.store(v, Ordering::Relaxed);
    }

    pub fn record_digest(&self, at_ns: u64, failed_sources: u64) {
        self.last_digest_at_ns.store(at_ns, Ordering::Relaxed);
        self.last_failed_sources.store(failed_sources, Ordering::Relaxed);
    }

    pub fn digest_running(&self) -> bool {
        self.digest_running.load(Ordering::Relaxed)
    }

    pub fn last_digest_at_ns(&self) -> u64 {
        self.last_digest_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_failed_sources(&self) -> u64 {
        self.last_failed_sources.load(Ordering::Relaxed)
    }
}
