//! Run orchestration.
//!
//! [`Orchestrator::run`] drives one validated [`RunPlan`] through the state
//! machine in [`state`]: optional site search, then the polarization sweep
//! over the resulting site set, then result assembly. Each call owns its run
//! context; nothing is shared between runs except the service handles and the
//! metrics counters.

pub mod outputs;
pub mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, Instrument};

use crate::aggregate::ResultAggregator;
use crate::domain::config::{FailurePolicy, RunPlan};
use crate::domain::error::MusiteError;
use crate::domain::site::{SiteId, SiteSet};
use crate::executor::{ExecutorOptions, GraphExecutor, GraphOutcome};
use crate::graph::{build_graph, TaskGraph};
use crate::metrics::Metrics;
use crate::obs;
use crate::services::{SignalSimulationService, SiteSearchService};

pub use outputs::{
    ExitKind, PolarizationOutputs, RunOutputs, RunReport, RunStatus, SiteSearchOutputs,
};
pub use state::{next_state, Flags, RunState, StepOutcome};

/// Mutable state of one run.
struct RunContext {
    run_id: String,
    plan: RunPlan,
    trace: Vec<RunState>,
    sites: Option<SiteSet>,
    anchor: Option<SiteId>,
    graph: Option<TaskGraph>,
    outcome: Option<GraphOutcome>,
    outputs: RunOutputs,
    exit: Option<ExitKind>,
    error: Option<String>,
}

impl RunContext {
    fn new(plan: RunPlan) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            plan,
            trace: Vec::new(),
            sites: None,
            anchor: None,
            graph: None,
            outcome: None,
            outputs: RunOutputs::default(),
            exit: None,
            error: None,
        }
    }

    fn flags(&self) -> Flags {
        Flags {
            do_implant: self.plan.do_implant,
            do_polarization: self.plan.do_polarization,
        }
    }

    fn fail(&mut self, exit: ExitKind, error: impl std::fmt::Display) -> StepOutcome {
        obs::emit_run_failed(&self.run_id, exit.as_str(), &error);
        self.exit = Some(exit);
        self.error = Some(error.to_string());
        StepOutcome::Failed
    }
}

/// Drives runs against a pair of services.
pub struct Orchestrator {
    search: Arc<dyn SiteSearchService>,
    simulator: Arc<dyn SignalSimulationService>,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        search: Arc<dyn SiteSearchService>,
        simulator: Arc<dyn SignalSimulationService>,
    ) -> Self {
        Self {
            search,
            simulator,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Execute one run to a terminal state.
    ///
    /// Failures never surface as `Err`: they end the run in `Failed` with an
    /// [`ExitKind`], and whatever outputs were published before the failure
    /// stay in the report.
    pub async fn run(&self, plan: RunPlan) -> RunReport {
        let ctx = RunContext::new(plan);
        let span = obs::run_span(&ctx.run_id);
        self.drive(ctx).instrument(span).await
    }

    async fn drive(&self, mut ctx: RunContext) -> RunReport {
        let started_at = Utc::now();
        self.metrics.inc_runs_started();
        obs::emit_run_started(
            &ctx.run_id,
            ctx.plan.structure.key().short(),
            ctx.plan.do_implant,
            ctx.plan.do_polarization,
        );

        let flags = ctx.flags();
        let mut state = RunState::Setup;
        loop {
            ctx.trace.push(state);
            obs::emit_state_entered(&ctx.run_id, state.as_str());
            if state.is_terminal() {
                break;
            }

            let outcome = match state {
                RunState::Implanting => self.implant(&mut ctx).await,
                RunState::PreparingPolarization => self.prepare(&mut ctx),
                RunState::ComputingPolarization => self.compute(&mut ctx).await,
                RunState::Results => self.results(&mut ctx),
                _ => StepOutcome::Succeeded,
            };
            state = next_state(state, flags, outcome);
        }

        let status = if state == RunState::Done {
            RunStatus::Done
        } else {
            self.metrics.inc_runs_failed();
            RunStatus::Failed
        };
        let report = RunReport {
            run_id: ctx.run_id,
            started_at,
            finished_at: Utc::now(),
            trace: ctx.trace,
            status,
            exit: ctx.exit,
            error: ctx.error,
            outputs: ctx.outputs,
        };
        obs::emit_run_finished(
            &report.run_id,
            report.duration_ms(),
            report.succeeded(),
            report.exit.map(|e| e.as_str()),
        );
        self.metrics.flush();
        report
    }

    async fn implant(&self, ctx: &mut RunContext) -> StepOutcome {
        self.metrics.inc_site_searches();
        let found = match self
            .search
            .search(&ctx.plan.structure, &ctx.plan.site_search)
            .await
        {
            Ok(found) => found,
            Err(e) => return ctx.fail(ExitKind::WorkchainFailed, MusiteError::from(e)),
        };
        let sites = match SiteSet::new(found) {
            Ok(sites) => sites,
            Err(e) => return ctx.fail(ExitKind::WorkchainFailed, MusiteError::from(e)),
        };

        obs::emit_sites_found(&ctx.run_id, sites.len());
        ctx.outputs.site_search = Some(SiteSearchOutputs {
            sites: sites.iter().cloned().collect(),
            ranking: sites.ranking(),
        });
        ctx.sites = Some(sites);
        StepOutcome::Succeeded
    }

    fn prepare(&self, ctx: &mut RunContext) -> StepOutcome {
        let sites = match ctx.sites.take() {
            Some(sites) => sites,
            None => SiteSet::synthesized(ctx.plan.structure.clone()),
        };
        ctx.anchor = sites
            .anchor(ctx.plan.anchor_policy)
            .map(|site| site.id.clone());
        debug!(anchor = ?ctx.anchor, policy = ?ctx.plan.anchor_policy, "anchor selected");

        let graph = build_graph(&sites, &ctx.plan.sweep, ctx.anchor.as_ref());
        obs::emit_graph_built(
            &ctx.run_id,
            graph.leaf_count(),
            sites.len(),
            ctx.anchor.as_ref().map(|a| a.as_str()),
        );
        ctx.graph = Some(graph);
        ctx.sites = Some(sites);
        StepOutcome::Succeeded
    }

    async fn compute(&self, ctx: &mut RunContext) -> StepOutcome {
        let (Some(graph), Some(sites)) = (ctx.graph.as_ref(), ctx.sites.as_ref()) else {
            return ctx.fail(ExitKind::PolarizationFailed, "polarization graph missing");
        };
        let executor = GraphExecutor::new(
            Arc::clone(&self.simulator),
            ExecutorOptions {
                max_concurrent: ctx.plan.max_concurrent,
            },
            Arc::clone(&self.metrics),
        );
        let outcome = executor
            .execute(&ctx.run_id, graph, sites, &ctx.plan.reference)
            .await;
        info!(
            event = "graph.completed",
            leaves = graph.leaf_count(),
            failed = outcome.failures.len(),
        );
        ctx.outcome = Some(outcome);
        StepOutcome::Succeeded
    }

    fn results(&self, ctx: &mut RunContext) -> StepOutcome {
        if ctx.exit.is_some() {
            return StepOutcome::Failed;
        }
        let Some(outcome) = ctx.outcome.take() else {
            // Polarization did not run.
            return StepOutcome::Succeeded;
        };
        let (Some(graph), Some(sites)) = (ctx.graph.take(), ctx.sites.take()) else {
            return ctx.fail(ExitKind::PolarizationFailed, "polarization graph missing");
        };

        let failed_sites = outcome.failed_sites();
        let unattributed = outcome.failures.iter().find(|f| f.site_id().is_none());
        match (ctx.plan.failure_policy, outcome.failures.first(), unattributed) {
            (_, None, _) => {}
            (FailurePolicy::WholeGraph, Some(first), _) => {
                let err = MusiteError::from(first.clone());
                return ctx.fail(ExitKind::PolarizationFailed, err);
            }
            (FailurePolicy::PerSite, Some(_), Some(unattributed)) => {
                let err = MusiteError::from(unattributed.clone());
                return ctx.fail(ExitKind::PolarizationFailed, err);
            }
            (FailurePolicy::PerSite, Some(first), None) => {
                if sites.iter().all(|s| failed_sites.contains(&s.id)) {
                    let err = MusiteError::from(first.clone());
                    return ctx.fail(ExitKind::PolarizationFailed, err);
                }
            }
        }

        let aggregator = ResultAggregator::new(
            ctx.plan.sample_directions.clone(),
            ctx.plan.convergence_direction,
        );
        let mut published = BTreeMap::new();
        for site in &sites {
            if failed_sites.contains(&site.id) {
                continue;
            }
            match aggregator.assemble_site(&graph, &site.id, &outcome.outputs) {
                Ok(result) => {
                    published.insert(site.id.clone(), result);
                }
                Err(e) => return ctx.fail(ExitKind::AggregationFailed, MusiteError::from(e)),
            }
        }

        ctx.outputs.polarization = Some(PolarizationOutputs {
            sites: published,
            anchor: ctx.anchor.clone(),
            failed_sites: failed_sites.into_iter().collect(),
        });
        StepOutcome::Succeeded
    }
}
