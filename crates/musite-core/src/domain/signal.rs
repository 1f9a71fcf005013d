//! Signal records: raw per-configuration output and derived aggregates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::site::SiteId;

/// Sampling direction of the polarization signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleDirection {
    X,
    Y,
    Z,
    Powder,
}

impl SampleDirection {
    pub const ALL: [SampleDirection; 4] = [
        SampleDirection::X,
        SampleDirection::Y,
        SampleDirection::Z,
        SampleDirection::Powder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleDirection::X => "x",
            SampleDirection::Y => "y",
            SampleDirection::Z => "z",
            SampleDirection::Powder => "powder",
        }
    }
}

impl std::fmt::Display for SampleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orientation of the external field relative to the initial polarization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDirectionClass {
    #[default]
    #[serde(alias = "lf")]
    Longitudinal,
    #[serde(alias = "tf")]
    Transverse,
}

impl FieldDirectionClass {
    /// Short tag used by solver output keys (`lf` / `tf`).
    pub fn tag(&self) -> &'static str {
        match self {
            FieldDirectionClass::Longitudinal => "lf",
            FieldDirectionClass::Transverse => "tf",
        }
    }
}

impl std::fmt::Display for FieldDirectionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One realization of the nuclear-isotope disorder around the impurity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotopeConfiguration {
    /// Isotope composition; an empty key marks a sentinel entry.
    pub composition_key: String,
    /// Spin quantum number per isotope.
    #[serde(default)]
    pub spins: BTreeMap<String, f64>,
    pub probability: f64,
}

impl IsotopeConfiguration {
    pub fn new(composition_key: impl Into<String>, probability: f64) -> Self {
        Self {
            composition_key: composition_key.into(),
            spins: BTreeMap::new(),
            probability,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.composition_key.trim().is_empty()
    }
}

/// Signals of one isotope configuration, per sampling direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSignal {
    pub configuration: IsotopeConfiguration,
    pub signals: BTreeMap<SampleDirection, Vec<f64>>,
}

/// What a signal-simulation call returns: a shared time axis (µs) and one
/// entry per isotope configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub times: Vec<f64>,
    pub configurations: Vec<ConfigurationSignal>,
}

impl SignalRecord {
    /// Sum of all configuration probabilities, sentinels included.
    pub fn probability_total(&self) -> f64 {
        self.configurations
            .iter()
            .map(|c| c.configuration.probability)
            .sum()
    }
}

/// Raw solver output for one sweep point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub site_id: SiteId,
    /// Field magnitude in Tesla.
    pub field: f64,
    pub field_direction: FieldDirectionClass,
    pub accuracy_level: u64,
    #[serde(flatten)]
    pub record: SignalRecord,
}

/// Time series sampled on an explicit axis (µs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Self {
        Self { times, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Probability-weighted average of a [`RawSignal`] along one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSignal {
    pub site_id: SiteId,
    pub field: f64,
    pub field_direction: FieldDirectionClass,
    pub accuracy_level: u64,
    pub direction: SampleDirection,
    pub series: TimeSeries,
}

/// Deviation of one accuracy level from the highest requested level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    pub site_id: SiteId,
    pub field: f64,
    pub direction: SampleDirection,
    pub accuracy_level: u64,
    /// `reference - signal`, per sample.
    pub delta_abs: Vec<f64>,
    /// `100 * delta_abs / reference`; NaN where the reference is zero.
    pub delta_rel: Vec<f64>,
}

/// Closed-form Kubo-Toyabe curve for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCurve {
    pub site_id: SiteId,
    /// Effective second moment in s⁻².
    pub gamma: f64,
    pub series: TimeSeries,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_direction_accepts_short_aliases() {
        let lf: FieldDirectionClass = serde_json::from_str("\"lf\"").unwrap();
        let tf: FieldDirectionClass = serde_json::from_str("\"transverse\"").unwrap();
        assert_eq!(lf, FieldDirectionClass::Longitudinal);
        assert_eq!(tf, FieldDirectionClass::Transverse);
        assert_eq!(tf.tag(), "tf");
    }

    #[test]
    fn test_sentinel_configuration() {
        assert!(IsotopeConfiguration::new("  ", 0.1).is_sentinel());
        assert!(!IsotopeConfiguration::new("63Cu", 0.1).is_sentinel());
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let json = serde_json::to_string(&SampleDirection::Powder).unwrap();
        assert_eq!(json, "\"powder\"");
    }
}
