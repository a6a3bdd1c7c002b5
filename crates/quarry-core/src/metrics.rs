//! Global atomic counters for search observability.
//!
//! Counters are incremented at the call site. [`Metrics::flush`] emits the
//! current values as one `tracing::info!` event, typically once per search.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    jobs_run: AtomicU64,
    jobs_failed: AtomicU64,
    results_streamed: AtomicU64,
    alerts_raised: AtomicU64,
    limit_hits: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            jobs_run: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            results_streamed: AtomicU64::new(0),
            alerts_raised: AtomicU64::new(0),
            limit_hits: AtomicU64::new(0),
        }
    }

    pub fn inc_jobs_run(&self) {
        self.jobs_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_run", "counter incremented");
    }

    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_failed", "counter incremented");
    }

    pub fn add_results_streamed(&self, n: u64) {
        self.results_streamed.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "results_streamed", n, "counter incremented");
    }

    pub fn inc_alerts_raised(&self) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "alerts_raised", "counter incremented");
    }

    pub fn inc_limit_hits(&self) {
        self.limit_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "limit_hits", "counter incremented");
    }

    /// Emit all counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            jobs_run = self.jobs_run(),
            jobs_failed = self.jobs_failed(),
            results_streamed = self.results_streamed(),
            alerts_raised = self.alerts_raised(),
            limit_hits = self.limit_hits(),
        );
    }

    pub fn jobs_run(&self) -> u64 {
        self.jobs_run.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn results_streamed(&self) -> u64 {
        self.results_streamed.load(Ordering::Relaxed)
    }

    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::Relaxed)
    }

    pub fn limit_hits(&self) -> u64 {
        self.limit_hits.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.jobs_run.store(0, Ordering::Relaxed);
        self.jobs_failed.store(0, Ordering::Relaxed);
        self.results_streamed.store(0, Ordering::Relaxed);
        self.alerts_raised.store(0, Ordering::Relaxed);
        self.limit_hits.store(0, Ordering::Relaxed);
    }
}
