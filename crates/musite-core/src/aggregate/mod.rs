//! Result aggregation: isotope averaging, convergence deltas and the
//! Kubo-Toyabe reference.
//!
//! Every value produced here is a pure function of the collected leaf outputs.

pub mod averaging;
pub mod convergence;
pub mod isotopes;
pub mod kubo_toyabe;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::AggregationError;
use crate::domain::signal::{
    ConvergenceRecord, FieldDirectionClass, RawSignal, ReferenceCurve, SampleDirection, TimeSeries,
};
use crate::domain::site::SiteId;
use crate::executor::LeafOutput;
use crate::graph::{Leaf, LeafId, TaskGraph};

pub use averaging::{aggregate, normalized_weights};
pub use convergence::convergence_deltas;
pub use kubo_toyabe::{kubo_toyabe, reference_curve, second_moment};

/// Aggregated production signals at one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSignals {
    /// Tesla.
    pub field: f64,
    pub field_direction: FieldDirectionClass,
    pub accuracy_level: u64,
    pub directions: BTreeMap<SampleDirection, TimeSeries>,
}

/// Everything published for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePolarization {
    /// In field order of the sweep.
    pub fields: Vec<FieldSignals>,
    /// Empty unless the site is the anchor and convergence was requested.
    pub convergence: Vec<ConvergenceRecord>,
    pub reference: Option<ReferenceCurve>,
}

/// Turns collected leaf outputs into per-site results.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    directions: Vec<SampleDirection>,
    convergence_direction: SampleDirection,
}

impl ResultAggregator {
    pub fn new(directions: Vec<SampleDirection>, convergence_direction: SampleDirection) -> Self {
        Self {
            directions,
            convergence_direction,
        }
    }

    /// Assemble the results of `site` from the leaves tagged with it.
    pub fn assemble_site(
        &self,
        graph: &TaskGraph,
        site: &SiteId,
        outputs: &BTreeMap<LeafId, LeafOutput>,
    ) -> Result<SitePolarization, AggregationError> {
        let mut fields = Vec::new();
        let mut ladder = Vec::new();
        let mut reference = None;

        for leaf in graph.group(site) {
            let output = outputs
                .get(&leaf.id())
                .ok_or_else(|| AggregationError::MissingOutput {
                    site_id: site.to_string(),
                    leaf: leaf.id().to_string(),
                })?;

            match (leaf, output) {
                (Leaf::Sweep(point), LeafOutput::Signal(raw)) if point.is_convergence_probe => {
                    ladder.extend(aggregate(raw, &[self.convergence_direction])?);
                }
                (Leaf::Sweep(_), LeafOutput::Signal(raw)) => {
                    fields.push(self.field_signals(raw)?);
                }
                (Leaf::Reference(_), LeafOutput::Reference(curve)) => {
                    reference = Some(curve.clone());
                }
                _ => {
                    return Err(AggregationError::MissingOutput {
                        site_id: site.to_string(),
                        leaf: leaf.id().to_string(),
                    })
                }
            }
        }

        let convergence = if ladder.is_empty() {
            Vec::new()
        } else {
            convergence_deltas(site.as_str(), &ladder)?
        };

        Ok(SitePolarization {
            fields,
            convergence,
            reference,
        })
    }

    fn field_signals(&self, raw: &RawSignal) -> Result<FieldSignals, AggregationError> {
        let directions = aggregate(raw, &self.directions)?
            .into_iter()
            .map(|a| (a.direction, a.series))
            .collect();
        Ok(FieldSignals {
            field: raw.field,
            field_direction: raw.field_direction,
            accuracy_level: raw.accuracy_level,
            directions,
        })
    }
}
