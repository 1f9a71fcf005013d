//! In-memory fakes for the service traits (testing only).
//!
//! [`StaticSiteSearch`] returns a fixed site list; [`SyntheticSignal`] builds
//! deterministic signal records from a list of isotope configurations and can
//! be told to fail, slow down or skew its time axis.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::config::SiteSearchParams;
use crate::domain::error::ServiceError;
use crate::domain::signal::{ConfigurationSignal, IsotopeConfiguration, SampleDirection, SignalRecord};
use crate::domain::site::Site;
use crate::domain::structure::Structure;
use crate::services::{SignalSimulationService, SimulationRequest, SiteSearchService};

// ---------------------------------------------------------------------------
// StaticSiteSearch
// ---------------------------------------------------------------------------

/// Site search returning a canned answer.
#[derive(Debug)]
pub struct StaticSiteSearch {
    result: Result<Vec<Site>, ServiceError>,
    calls: AtomicUsize,
}

impl StaticSiteSearch {
    pub fn new(sites: Vec<Site>) -> Self {
        Self {
            result: Ok(sites),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(ServiceError::failed("site-search", reason)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteSearchService for StaticSiteSearch {
    async fn search(
        &self,
        _structure: &Structure,
        _params: &SiteSearchParams,
    ) -> Result<Vec<Site>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// SyntheticSignal
// ---------------------------------------------------------------------------

/// Signal service producing flat per-configuration series.
///
/// Configuration `i` yields `values[i]` at every sample and in every
/// direction, plus `1 / accuracy_level` when the accuracy offset is on.
#[derive(Debug)]
pub struct SyntheticSignal {
    configurations: Vec<(IsotopeConfiguration, f64)>,
    times: Vec<f64>,
    accuracy_offset: bool,
    skew_grid_by_level: bool,
    fail_labels: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<SimulationRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SyntheticSignal {
    /// `configurations` as `(composition key, probability, value)`.
    pub fn new(configurations: &[(&str, f64, f64)]) -> Self {
        Self {
            configurations: configurations
                .iter()
                .map(|(key, p, v)| (IsotopeConfiguration::new(*key, *p), *v))
                .collect(),
            times: vec![0.0, 0.5, 1.0],
            accuracy_offset: false,
            skew_grid_by_level: false,
            fail_labels: HashSet::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Single configuration of unit probability.
    pub fn single(value: f64) -> Self {
        Self::new(&[("1H", 1.0, value)])
    }

    pub fn with_times(mut self, times: Vec<f64>) -> Self {
        self.times = times;
        self
    }

    pub fn with_accuracy_offset(mut self) -> Self {
        self.accuracy_offset = true;
        self
    }

    /// Shift the time axis by the accuracy level, so ladders never align.
    pub fn with_skewed_grid(mut self) -> Self {
        self.skew_grid_by_level = true;
        self
    }

    /// Fail every call whose structure carries `label`.
    pub fn failing_for(mut self, label: &str) -> Self {
        self.fail_labels.insert(label.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<SimulationRequest> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, request: &SimulationRequest) -> SignalRecord {
        let offset = if self.accuracy_offset {
            1.0 / request.accuracy_level as f64
        } else {
            0.0
        };
        let shift = if self.skew_grid_by_level {
            request.accuracy_level as f64 * 1e-3
        } else {
            0.0
        };
        let times: Vec<f64> = self.times.iter().map(|t| t + shift).collect();
        let configurations = self
            .configurations
            .iter()
            .map(|(configuration, value)| {
                let series = vec![value + offset; times.len()];
                let signals: BTreeMap<SampleDirection, Vec<f64>> = SampleDirection::ALL
                    .iter()
                    .map(|d| (*d, series.clone()))
                    .collect();
                ConfigurationSignal {
                    configuration: configuration.clone(),
                    signals,
                }
            })
            .collect();
        SignalRecord {
            times,
            configurations,
        }
    }
}

#[async_trait]
impl SignalSimulationService for SyntheticSignal {
    async fn simulate(&self, request: &SimulationRequest) -> Result<SignalRecord, ServiceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_labels.contains(&request.structure.label) {
            return Err(ServiceError::failed(
                "signal-simulation",
                format!("solver diverged for {}", request.structure.label),
            ));
        }
        Ok(self.record(request))
    }
}
