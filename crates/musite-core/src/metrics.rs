//! Atomic counters for one orchestrator.
//!
//! Counters are bumped silently at the call site; [`Metrics::flush`] emits the
//! current values as a single `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lightweight atomic counters. No allocations, no locking.
#[derive(Debug)]
pub struct Metrics {
    runs_started: AtomicU64,
    runs_failed: AtomicU64,
    site_searches: AtomicU64,
    simulations: AtomicU64,
    simulation_failures: AtomicU64,
    references: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            site_searches: AtomicU64::new(0),
            simulations: AtomicU64::new(0),
            simulation_failures: AtomicU64::new(0),
            references: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_site_searches(&self) {
        self.site_searches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "site_searches", "counter incremented");
    }

    /// Count one signal-simulation call, successful or not.
    pub fn inc_simulations(&self) {
        self.simulations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "simulations", "counter incremented");
    }

    pub fn inc_simulation_failures(&self) {
        self.simulation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_references(&self) {
        self.references.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            runs_failed = self.runs_failed(),
            site_searches = self.site_searches(),
            simulations = self.simulations(),
            simulation_failures = self.simulation_failures(),
            references = self.references(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn site_searches(&self) -> u64 {
        self.site_searches.load(Ordering::Relaxed)
    }

    pub fn simulations(&self) -> u64 {
        self.simulations.load(Ordering::Relaxed)
    }

    pub fn simulation_failures(&self) -> u64 {
        self.simulation_failures.load(Ordering::Relaxed)
    }

    pub fn references(&self) -> u64 {
        self.references.load(Ordering::Relaxed)
    }
}
