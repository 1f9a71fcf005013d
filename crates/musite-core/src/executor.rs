//! Generic fan-out/fan-in execution of a [`TaskGraph`].
//!
//! Every leaf runs in its own tokio task; a semaphore bounds how many are in
//! flight. Sweep points call the signal-simulation service, reference calls are
//! evaluated locally on the blocking pool. Results land in a write-once map
//! keyed by [`LeafId`]. All spawned tasks are awaited before returning, failed
//! or not.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::aggregate::kubo_toyabe::reference_curve;
use crate::domain::config::ReferenceParams;
use crate::domain::error::{ServiceError, ValidationError};
use crate::domain::signal::{RawSignal, ReferenceCurve};
use crate::domain::site::{SiteId, SiteSet};
use crate::domain::structure::Structure;
use crate::graph::{Leaf, LeafId, TaskGraph};
use crate::metrics::Metrics;
use crate::obs;
use crate::services::{SignalSimulationService, SimulationRequest};

/// Errors collected while executing a graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutorError {
    #[error("{leaf} of site {site_id} failed: {source}")]
    Service {
        leaf: LeafId,
        site_id: SiteId,
        source: ServiceError,
    },

    #[error("reference {leaf} of site {site_id} failed: {source}")]
    Reference {
        leaf: LeafId,
        site_id: SiteId,
        source: ValidationError,
    },

    #[error("{leaf} of site {site_id} panicked: {reason}")]
    Panicked {
        leaf: LeafId,
        site_id: SiteId,
        reason: String,
    },

    #[error("{leaf} references site {site_id}, which is not in the site set")]
    UnknownSite { leaf: LeafId, site_id: SiteId },

    #[error("{leaf} written twice")]
    DuplicateWrite { leaf: LeafId },
}

impl ExecutorError {
    pub fn leaf(&self) -> LeafId {
        match self {
            ExecutorError::Service { leaf, .. }
            | ExecutorError::Reference { leaf, .. }
            | ExecutorError::Panicked { leaf, .. }
            | ExecutorError::UnknownSite { leaf, .. }
            | ExecutorError::DuplicateWrite { leaf } => *leaf,
        }
    }

    pub fn site_id(&self) -> Option<&SiteId> {
        match self {
            ExecutorError::Service { site_id, .. }
            | ExecutorError::Reference { site_id, .. }
            | ExecutorError::Panicked { site_id, .. }
            | ExecutorError::UnknownSite { site_id, .. } => Some(site_id),
            ExecutorError::DuplicateWrite { .. } => None,
        }
    }
}

/// What one leaf produced.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafOutput {
    Signal(RawSignal),
    Reference(ReferenceCurve),
}

/// Per-run write-once result map.
#[derive(Debug, Default)]
struct LeafStore {
    inner: Mutex<BTreeMap<LeafId, LeafOutput>>,
}

impl LeafStore {
    async fn put(&self, leaf: LeafId, output: LeafOutput) -> Result<(), ExecutorError> {
        let mut guard = self.inner.lock().await;
        if guard.contains_key(&leaf) {
            return Err(ExecutorError::DuplicateWrite { leaf });
        }
        guard.insert(leaf, output);
        Ok(())
    }

    fn into_map(self) -> BTreeMap<LeafId, LeafOutput> {
        self.inner.into_inner()
    }
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum number of leaves in flight.
    pub max_concurrent: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self { max_concurrent: 8 }
    }
}

/// Everything a graph execution produced.
#[derive(Debug, Default)]
pub struct GraphOutcome {
    pub outputs: BTreeMap<LeafId, LeafOutput>,
    /// Failures in leaf order.
    pub failures: Vec<ExecutorError>,
}

impl GraphOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Sites with at least one failed leaf.
    pub fn failed_sites(&self) -> BTreeSet<SiteId> {
        self.failures
            .iter()
            .filter_map(|f| f.site_id().cloned())
            .collect()
    }
}

/// Runs task graphs against a signal-simulation service.
pub struct GraphExecutor {
    simulator: Arc<dyn SignalSimulationService>,
    options: ExecutorOptions,
    metrics: Arc<Metrics>,
}

impl GraphExecutor {
    pub fn new(
        simulator: Arc<dyn SignalSimulationService>,
        options: ExecutorOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            simulator,
            options,
            metrics,
        }
    }

    /// Execute every leaf of `graph` and wait for all of them.
    ///
    /// Never short-circuits: failures are collected, and applying a failure
    /// policy is up to the caller.
    pub async fn execute(
        &self,
        run_id: &str,
        graph: &TaskGraph,
        sites: &SiteSet,
        reference: &ReferenceParams,
    ) -> GraphOutcome {
        let structures: HashMap<SiteId, Arc<Structure>> = sites
            .iter()
            .map(|s| (s.id.clone(), Arc::new(s.structure.clone())))
            .collect();
        let store = Arc::new(LeafStore::default());
        let reference = Arc::new(reference.clone());
        let sem = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));

        let mut failures = Vec::new();
        let mut tags = Vec::with_capacity(graph.leaf_count());
        let mut tasks = Vec::with_capacity(graph.leaf_count());

        for leaf in &graph.leaves {
            let leaf_id = leaf.id();
            let site_id = leaf.site_id().clone();
            let Some(structure) = structures.get(&site_id).cloned() else {
                failures.push(ExecutorError::UnknownSite {
                    leaf: leaf_id,
                    site_id,
                });
                continue;
            };

            let leaf = leaf.clone();
            let simulator = Arc::clone(&self.simulator);
            let metrics = Arc::clone(&self.metrics);
            let store = Arc::clone(&store);
            let reference = Arc::clone(&reference);
            let sem = Arc::clone(&sem);

            let task = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let output = run_leaf(&leaf, structure, simulator.as_ref(), &reference, &metrics).await?;
                store.put(leaf.id(), output).await
            });
            tags.push((leaf_id, site_id));
            tasks.push(task);
        }

        let joined = futures::future::join_all(tasks).await;
        for ((leaf, site_id), result) in tags.into_iter().zip(joined) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(e),
                Err(join) => failures.push(ExecutorError::Panicked {
                    leaf,
                    site_id,
                    reason: join.to_string(),
                }),
            }
        }

        failures.sort_by_key(|f| f.leaf());
        for f in &failures {
            let site = f.site_id().map(|s| s.as_str()).unwrap_or("-");
            obs::emit_leaf_failed(run_id, &f.leaf().to_string(), site, f);
        }

        let outputs = match Arc::try_unwrap(store) {
            Ok(store) => store.into_map(),
            // Every task has been awaited, so no other handle is alive.
            Err(shared) => shared.inner.lock().await.clone(),
        };
        GraphOutcome { outputs, failures }
    }
}

async fn run_leaf(
    leaf: &Leaf,
    structure: Arc<Structure>,
    simulator: &dyn SignalSimulationService,
    reference: &Arc<ReferenceParams>,
    metrics: &Metrics,
) -> Result<LeafOutput, ExecutorError> {
    match leaf {
        Leaf::Sweep(point) => {
            metrics.inc_simulations();
            let request = SimulationRequest {
                structure: structure.as_ref().clone(),
                field: point.field,
                field_direction: point.field_direction,
                accuracy_level: point.accuracy_level,
            };
            let record = simulator
                .simulate(&request)
                .await
                .and_then(|record| {
                    if record.times.is_empty() {
                        Err(ServiceError::invalid_output(
                            "signal-simulation",
                            "empty time axis",
                        ))
                    } else {
                        Ok(record)
                    }
                })
                .map_err(|source| {
                    metrics.inc_simulation_failures();
                    ExecutorError::Service {
                        leaf: point.leaf,
                        site_id: point.site_id.clone(),
                        source,
                    }
                })?;
            Ok(LeafOutput::Signal(RawSignal {
                site_id: point.site_id.clone(),
                field: point.field,
                field_direction: point.field_direction,
                accuracy_level: point.accuracy_level,
                record,
            }))
        }
        Leaf::Reference(call) => {
            metrics.inc_references();
            let site_id = call.site_id.clone();
            let params = Arc::clone(reference);
            let computed = tokio::task::spawn_blocking(move || {
                reference_curve(&site_id, &structure, &params)
            })
            .await
            .map_err(|join| ExecutorError::Panicked {
                leaf: call.leaf,
                site_id: call.site_id.clone(),
                reason: join.to_string(),
            })?;
            let curve = computed.map_err(|source| ExecutorError::Reference {
                leaf: call.leaf,
                site_id: call.site_id.clone(),
                source,
            })?;
            Ok(LeafOutput::Reference(curve))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_rejects_second_write() {
        let store = LeafStore::default();
        let curve = ReferenceCurve {
            site_id: SiteId::new("1"),
            gamma: 0.0,
            series: Default::default(),
        };
        store
            .put(LeafId(0), LeafOutput::Reference(curve.clone()))
            .await
            .unwrap();
        let err = store
            .put(LeafId(0), LeafOutput::Reference(curve))
            .await
            .unwrap_err();
        assert_eq!(err, ExecutorError::DuplicateWrite { leaf: LeafId(0) });
    }

    #[test]
    fn test_failed_sites_collects_tags() {
        let outcome = GraphOutcome {
            outputs: BTreeMap::new(),
            failures: vec![
                ExecutorError::Service {
                    leaf: LeafId(1),
                    site_id: SiteId::new("2"),
                    source: ServiceError::failed("signal-simulation", "boom"),
                },
                ExecutorError::DuplicateWrite { leaf: LeafId(3) },
            ],
        };
        assert!(!outcome.is_complete());
        let failed: Vec<_> = outcome.failed_sites().into_iter().collect();
        assert_eq!(failed, vec![SiteId::new("2")]);
    }
}
