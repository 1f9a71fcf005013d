//! Domain model: structures, sites, signals, configuration and errors.

pub mod config;
pub mod error;
pub mod signal;
pub mod site;
pub mod structure;

pub use config::{
    FailurePolicy, FieldUnit, PolarizationParams, ReferenceParams, RunConfig, RunOptions, RunPlan,
    SiteSearchParams, SweepSpec,
};
pub use error::{AggregationError, MusiteError, Result, ServiceError, ValidationError};
pub use signal::{
    AggregatedSignal, ConfigurationSignal, ConvergenceRecord, FieldDirectionClass,
    IsotopeConfiguration, RawSignal, ReferenceCurve, SampleDirection, SignalRecord, TimeSeries,
};
pub use site::{AnchorPolicy, Site, SiteId, SiteSet, SiteSummary, SYNTHESIZED_SITE_ID};
pub use structure::{Atom, Structure, StructureKey, DEFAULT_IMPURITY_SYMBOL};
