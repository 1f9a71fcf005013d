//! Isotope-weighted averaging of raw solver output.

use tracing::warn;

use crate::domain::error::AggregationError;
use crate::domain::signal::{
    AggregatedSignal, ConfigurationSignal, RawSignal, SampleDirection, TimeSeries,
};

/// Deviation from unit total probability tolerated without a warning.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Normalized weights of the non-sentinel configurations, as
/// `(index into configurations, weight)`.
///
/// Weights always sum to one; a total outside [`PROBABILITY_TOLERANCE`] of one
/// is logged but not rejected. A non-positive or non-finite remaining total is
/// an error.
pub fn normalized_weights(
    site_id: &str,
    configurations: &[ConfigurationSignal],
) -> Result<Vec<(usize, f64)>, AggregationError> {
    let raw_total: f64 = configurations
        .iter()
        .map(|c| c.configuration.probability)
        .sum();
    if (raw_total - 1.0).abs() > PROBABILITY_TOLERANCE {
        warn!(
            event = "aggregate.probability_drift",
            site_id = %site_id,
            total = raw_total,
            "isotope probabilities do not sum to one"
        );
    }

    let included: Vec<(usize, f64)> = configurations
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.configuration.is_sentinel())
        .map(|(i, c)| (i, c.configuration.probability))
        .collect();
    let total: f64 = included.iter().map(|(_, p)| p).sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(AggregationError::DegenerateWeights {
            site_id: site_id.to_string(),
            total,
        });
    }

    Ok(included.into_iter().map(|(i, p)| (i, p / total)).collect())
}

/// Average `raw` over isotope configurations, one [`AggregatedSignal`] per
/// requested direction (in the order given).
pub fn aggregate(
    raw: &RawSignal,
    directions: &[SampleDirection],
) -> Result<Vec<AggregatedSignal>, AggregationError> {
    let site_id = raw.site_id.as_str();
    let configurations = &raw.record.configurations;
    let weights = normalized_weights(site_id, configurations)?;
    let n = raw.record.times.len();

    let mut out = Vec::with_capacity(directions.len());
    for &direction in directions {
        let mut values = vec![0.0; n];
        for &(i, w) in &weights {
            let config = &configurations[i];
            let series = config.signals.get(&direction).ok_or_else(|| {
                AggregationError::MissingDirection {
                    site_id: site_id.to_string(),
                    key: config.configuration.composition_key.clone(),
                    direction: direction.to_string(),
                }
            })?;
            if series.len() != n {
                return Err(AggregationError::LengthMismatch {
                    site_id: site_id.to_string(),
                    key: config.configuration.composition_key.clone(),
                    expected: n,
                    actual: series.len(),
                });
            }
            for (acc, v) in values.iter_mut().zip(series) {
                *acc += w * v;
            }
        }
        out.push(AggregatedSignal {
            site_id: raw.site_id.clone(),
            field: raw.field,
            field_direction: raw.field_direction,
            accuracy_level: raw.accuracy_level,
            direction,
            series: TimeSeries::new(raw.record.times.clone(), values),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::signal::{FieldDirectionClass, IsotopeConfiguration, SignalRecord};
    use crate::domain::site::SiteId;

    fn config(key: &str, p: f64, z: Vec<f64>) -> ConfigurationSignal {
        let mut signals = BTreeMap::new();
        signals.insert(SampleDirection::Z, z);
        ConfigurationSignal {
            configuration: IsotopeConfiguration::new(key, p),
            signals,
        }
    }

    fn raw(configurations: Vec<ConfigurationSignal>) -> RawSignal {
        RawSignal {
            site_id: SiteId::new("1"),
            field: 0.0,
            field_direction: FieldDirectionClass::Longitudinal,
            accuracy_level: 100,
            record: SignalRecord {
                times: vec![0.0, 1.0, 2.0],
                configurations,
            },
        }
    }

    #[test]
    fn test_weights_sum_to_one_after_sentinel_exclusion() {
        let configs = vec![
            config("63Cu", 0.5, vec![0.0; 3]),
            config("", 0.3, vec![0.0; 3]),
            config("65Cu", 0.25, vec![0.0; 3]),
        ];
        let w = normalized_weights("1", &configs).unwrap();
        assert_eq!(w.len(), 2);
        let total: f64 = w.iter().map(|(_, x)| x).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((w[0].1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_configuration_is_identity() {
        let z = vec![1.0, 0.6, 0.25];
        let out = aggregate(&raw(vec![config("1H", 1.0, z.clone())]), &[SampleDirection::Z]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].series.values, z);
        assert_eq!(out[0].series.times, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_weighted_average() {
        let out = aggregate(
            &raw(vec![
                config("A", 0.7, vec![1.0, 1.0, 1.0]),
                config("B", 0.3, vec![0.0, 0.0, 0.0]),
            ]),
            &[SampleDirection::Z],
        )
        .unwrap();
        for v in &out[0].series.values {
            assert!((v - 0.7).abs() < 1e-12);
        }
    }

    #[test]
    fn test_all_sentinels_is_degenerate() {
        let res = aggregate(&raw(vec![config(" ", 1.0, vec![1.0; 3])]), &[SampleDirection::Z]);
        assert!(matches!(res, Err(AggregationError::DegenerateWeights { .. })));
    }

    #[test]
    fn test_missing_direction_and_length_mismatch() {
        let r = raw(vec![config("A", 1.0, vec![1.0; 3])]);
        assert!(matches!(
            aggregate(&r, &[SampleDirection::Powder]),
            Err(AggregationError::MissingDirection { .. })
        ));

        let r = raw(vec![config("A", 1.0, vec![1.0; 2])]);
        assert!(matches!(
            aggregate(&r, &[SampleDirection::Z]),
            Err(AggregationError::LengthMismatch { expected: 3, actual: 2, .. })
        ));
    }
}
