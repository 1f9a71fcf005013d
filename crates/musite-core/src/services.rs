//! Contracts of the two external collaborators.
//!
//! Both services are opaque, slow and may fail. Implementations live outside
//! this crate (`musite-shell`) or in [`crate::fakes`] for tests.

use serde::{Deserialize, Serialize};

use crate::domain::config::SiteSearchParams;
use crate::domain::error::ServiceError;
use crate::domain::signal::{FieldDirectionClass, SignalRecord};
use crate::domain::site::Site;
use crate::domain::structure::Structure;

/// Locates candidate impurity stopping sites.
#[async_trait::async_trait]
pub trait SiteSearchService: Send + Sync {
    /// Search `structure` for candidate sites, in enumeration order.
    ///
    /// An empty result is valid. Returned ids must be unique.
    async fn search(
        &self,
        structure: &Structure,
        params: &SiteSearchParams,
    ) -> Result<Vec<Site>, ServiceError>;
}

/// Input of one signal-simulation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub structure: Structure,
    /// Tesla.
    pub field: f64,
    pub field_direction: FieldDirectionClass,
    pub accuracy_level: u64,
}

/// Computes the raw depolarization signal for one sweep point.
#[async_trait::async_trait]
pub trait SignalSimulationService: Send + Sync {
    async fn simulate(&self, request: &SimulationRequest) -> Result<SignalRecord, ServiceError>;
}
