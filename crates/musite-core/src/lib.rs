//! musite core library
//!
//! Muon stopping-site discovery and polarization sweep orchestration: run
//! configuration, the dynamic task graph, its executor, result aggregation
//! and the run state machine.

pub mod aggregate;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod graph;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod services;
pub mod telemetry;

pub use aggregate::{FieldSignals, ResultAggregator, SitePolarization};

pub use domain::{
    AggregatedSignal, AggregationError, AnchorPolicy, Atom, ConfigurationSignal,
    ConvergenceRecord, FailurePolicy, FieldDirectionClass, FieldUnit, IsotopeConfiguration,
    MusiteError, PolarizationParams, RawSignal, ReferenceCurve, ReferenceParams, Result,
    RunConfig, RunOptions, RunPlan, SampleDirection, ServiceError, SignalRecord, Site, SiteId,
    SiteSearchParams, SiteSet, SiteSummary, Structure, StructureKey, SweepSpec, TimeSeries,
    ValidationError, DEFAULT_IMPURITY_SYMBOL, SYNTHESIZED_SITE_ID,
};

pub use executor::{ExecutorError, ExecutorOptions, GraphExecutor, GraphOutcome, LeafOutput};

pub use graph::{build_graph, Leaf, LeafId, ReferenceCall, SweepPoint, TaskGraph};

pub use metrics::Metrics;

pub use orchestrator::{
    ExitKind, Orchestrator, PolarizationOutputs, RunOutputs, RunReport, RunState, RunStatus,
    SiteSearchOutputs,
};

pub use services::{SignalSimulationService, SimulationRequest, SiteSearchService};
