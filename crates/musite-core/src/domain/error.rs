//! Domain-level error taxonomy for musite.

/// Errors produced by run configuration validation.
///
/// These are raised before a run exists and never reach the orchestrator's
/// state machine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("structure has no atoms")]
    EmptyStructure,

    #[error("impurity atom not found in structure (symbol {symbol})")]
    MissingImpurity { symbol: String },

    #[error("impurity index {index} out of range for {atoms} atoms")]
    ImpurityIndexOutOfRange { index: usize, atoms: usize },

    #[error("field list must not be empty")]
    EmptyFields,

    #[error("field magnitude must be finite and non-negative, got {value}")]
    InvalidField { value: f64 },

    #[error("accuracy level list must not be empty")]
    EmptyAccuracyLevels,

    #[error("accuracy levels must be positive, got {value}")]
    InvalidAccuracyLevel { value: u64 },

    #[error("at least one sample direction is required")]
    EmptyDirections,

    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error("invalid site search parameter {field}: {reason}")]
    InvalidSiteSearch { field: String, reason: String },

    #[error("invalid reference parameter {field}: {reason}")]
    InvalidReference { field: String, reason: String },

    #[error("duplicate site id in site set: {id}")]
    DuplicateSiteId { id: String },
}

/// Errors produced while aggregating collected signals.
///
/// An aggregation error means the collected data is inconsistent, not that an
/// external service failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("misaligned time grid for site {site_id} at accuracy level {accuracy_level}")]
    MisalignedTimeGrid {
        site_id: String,
        accuracy_level: u64,
    },

    #[error("isotope weights for site {site_id} sum to {total} after exclusions")]
    DegenerateWeights { site_id: String, total: f64 },

    #[error("configuration {key} of site {site_id} has no signal for direction {direction}")]
    MissingDirection {
        site_id: String,
        key: String,
        direction: String,
    },

    #[error("configuration {key} of site {site_id} has {actual} samples, time axis has {expected}")]
    LengthMismatch {
        site_id: String,
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("no convergence ladder for site {site_id}")]
    EmptyLadder { site_id: String },

    #[error("no collected output for {leaf} of site {site_id}")]
    MissingOutput { site_id: String, leaf: String },
}

/// Errors reported by the external site-search and signal-simulation services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} failed: {reason}")]
    Failed { service: String, reason: String },

    #[error("{service} timed out after {seconds} seconds")]
    Timeout { service: String, seconds: u64 },

    #[error("{service} returned invalid output: {reason}")]
    InvalidOutput { service: String, reason: String },
}

impl ServiceError {
    pub fn failed(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_output(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOutput {
            service: service.into(),
            reason: reason.into(),
        }
    }
}

/// musite domain errors.
#[derive(Debug, thiserror::Error)]
pub enum MusiteError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("executor error: {0}")]
    Executor(#[from] crate::executor::ExecutorError),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for musite domain operations.
pub type Result<T> = std::result::Result<T, MusiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidField { value: -1.0 };
        assert!(err.to_string().contains("non-negative"));

        let err = ValidationError::DuplicateSiteId {
            id: "3".to_string(),
        };
        assert!(err.to_string().contains("duplicate site id"));
    }

    #[test]
    fn test_aggregation_error_names_site_and_level() {
        let err = AggregationError::MisalignedTimeGrid {
            site_id: "7".to_string(),
            accuracy_level: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("misaligned"));
        assert!(msg.contains('7'));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_service_error_wraps_into_musite_error() {
        let err: MusiteError = ServiceError::failed("site-search", "relaxation diverged").into();
        assert!(err.to_string().contains("service error"));
        assert!(err.to_string().contains("relaxation diverged"));
    }
}
