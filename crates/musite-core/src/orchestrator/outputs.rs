//! Typed run outputs and the run report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::SitePolarization;
use crate::domain::signal::{ConvergenceRecord, SampleDirection, TimeSeries};
use crate::domain::site::{Site, SiteId, SiteSummary};
use crate::orchestrator::state::RunState;

/// Terminal failure kinds, with their numeric exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitKind {
    WorkchainFailed,
    PolarizationFailed,
    AggregationFailed,
}

impl ExitKind {
    pub fn code(&self) -> u16 {
        match self {
            ExitKind::WorkchainFailed => 400,
            ExitKind::PolarizationFailed => 401,
            ExitKind::AggregationFailed => 402,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitKind::WorkchainFailed => "WORKCHAIN_FAILED",
            ExitKind::PolarizationFailed => "POLARIZATION_FAILED",
            ExitKind::AggregationFailed => "AGGREGATION_FAILED",
        }
    }
}

impl std::fmt::Display for ExitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSearchOutputs {
    pub sites: Vec<Site>,
    pub ranking: Vec<SiteSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarizationOutputs {
    pub sites: BTreeMap<SiteId, SitePolarization>,
    pub anchor: Option<SiteId>,
    /// Sites dropped under the per-site failure policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_sites: Vec<SiteId>,
}

impl PolarizationOutputs {
    /// Production series of `site` at `field` (Tesla) along `direction`.
    pub fn signal(&self, site: &SiteId, field: f64, direction: SampleDirection) -> Option<&TimeSeries> {
        self.sites
            .get(site)?
            .fields
            .iter()
            .find(|f| (f.field - field).abs() <= 1e-12)?
            .directions
            .get(&direction)
    }

    /// All convergence records, across sites.
    pub fn convergence(&self) -> Vec<&ConvergenceRecord> {
        self.sites.values().flat_map(|s| s.convergence.iter()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutputs {
    pub site_search: Option<SiteSearchOutputs>,
    pub polarization: Option<PolarizationOutputs>,
}

impl RunOutputs {
    pub fn is_empty(&self) -> bool {
        self.site_search.is_none() && self.polarization.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Done,
    Failed,
}

/// Final record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// States visited, in order.
    pub trace: Vec<RunState>,
    pub status: RunStatus,
    pub exit: Option<ExitKind>,
    pub error: Option<String>,
    pub outputs: RunOutputs,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Done
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
