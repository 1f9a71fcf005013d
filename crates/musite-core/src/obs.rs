//! Structured observability hooks for the run lifecycle.
//!
//! Every hook emits one `tracing` event with an `event = "..."` field so log
//! pipelines can filter on it. Run-scoped fields come from [`run_span`].

use tracing::{info, warn};

/// Run-scoped span; every event emitted while it is active carries `run_id`.
///
/// Attach it with [`tracing::Instrument`] so it follows the run across
/// `.await` points:
///
/// ```ignore
/// async { /* ... */ }.instrument(run_span("0b9c...")).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("musite.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, structure_key: &str, do_implant: bool, do_polarization: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        structure = %structure_key,
        do_implant = do_implant,
        do_polarization = do_polarization,
    );
}

/// Emit event: state machine transition.
pub fn emit_state_entered(run_id: &str, state: &str) {
    info!(event = "run.state", run_id = %run_id, state = %state);
}

/// Emit event: site search returned.
pub fn emit_sites_found(run_id: &str, count: usize) {
    info!(event = "site_search.completed", run_id = %run_id, sites = count);
}

/// Emit event: task graph built and about to be submitted.
pub fn emit_graph_built(run_id: &str, leaves: usize, sites: usize, anchor: Option<&str>) {
    info!(
        event = "graph.built",
        run_id = %run_id,
        leaves = leaves,
        sites = sites,
        anchor = anchor.unwrap_or("-"),
    );
}

/// Emit event: one leaf failed (warning level).
pub fn emit_leaf_failed(run_id: &str, leaf: &str, site_id: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "leaf.failed",
        run_id = %run_id,
        leaf = %leaf,
        site_id = %site_id,
        error = %error,
    );
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool, exit: Option<&str>) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
        exit = exit.unwrap_or("-"),
    );
}

/// Emit event: run failed with an error (warning level).
pub fn emit_run_failed(run_id: &str, exit: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, exit = %exit, error = %error);
}
