//! Averaging, convergence and reference-function properties.

use std::collections::BTreeMap;

use musite_core::aggregate::{aggregate, convergence_deltas, kubo_toyabe, normalized_weights};
use musite_core::{
    ConfigurationSignal, FieldDirectionClass, IsotopeConfiguration, RawSignal, SampleDirection,
    SignalRecord, SiteId,
};

fn configuration(key: &str, p: f64, values: Vec<f64>) -> ConfigurationSignal {
    let signals = SampleDirection::ALL
        .iter()
        .map(|d| (*d, values.clone()))
        .collect::<BTreeMap<_, _>>();
    ConfigurationSignal {
        configuration: IsotopeConfiguration::new(key, p),
        signals,
    }
}

fn raw(level: u64, times: Vec<f64>, configurations: Vec<ConfigurationSignal>) -> RawSignal {
    RawSignal {
        site_id: SiteId::new("1"),
        field: 0.0,
        field_direction: FieldDirectionClass::Longitudinal,
        accuracy_level: level,
        record: SignalRecord {
            times,
            configurations,
        },
    }
}

#[test]
fn weights_renormalize_over_included_configurations() {
    // Deterministic pseudo-random probability sets, some with sentinels.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed % 10_000) as f64 / 10_000.0 + 1e-6
    };

    for n in 1..12 {
        let configs: Vec<ConfigurationSignal> = (0..n)
            .map(|i| {
                let key = if i % 4 == 3 { String::new() } else { format!("iso{i}") };
                configuration(&key, next(), vec![0.0])
            })
            .collect();
        let weights = normalized_weights("1", &configs).unwrap();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9, "n={n} total={total}");
        assert!(weights.iter().all(|(i, _)| !configs[*i].configuration.is_sentinel()));
    }
}

#[test]
fn single_configuration_passes_through() {
    let values = vec![1.0, 0.8, 0.55, 0.4];
    let r = raw(100, vec![0.0, 1.0, 2.0, 3.0], vec![configuration("27Al", 1.0, values.clone())]);
    for agg in aggregate(&r, &SampleDirection::ALL).unwrap() {
        assert_eq!(agg.series.values, values);
    }
}

#[test]
fn two_configuration_weighted_mean() {
    let r = raw(
        100,
        vec![0.0, 1.0, 2.0],
        vec![
            configuration("A", 0.7, vec![1.0, 1.0, 1.0]),
            configuration("B", 0.3, vec![0.0, 0.0, 0.0]),
        ],
    );
    let out = aggregate(&r, &[SampleDirection::X]).unwrap();
    assert_eq!(out[0].direction, SampleDirection::X);
    for v in &out[0].series.values {
        assert!((v - 0.7).abs() < 1e-12);
    }
}

#[test]
fn reference_level_compares_to_itself() {
    let times = vec![0.0, 0.5, 1.0];
    let ladder: Vec<_> = [10u64, 100, 1000]
        .iter()
        .flat_map(|&level| {
            let v = 1.0 / level as f64;
            let r = raw(level, times.clone(), vec![configuration("A", 1.0, vec![1.0, v, 0.0])]);
            aggregate(&r, &[SampleDirection::Z]).unwrap()
        })
        .collect();

    let records = convergence_deltas("1", &ladder).unwrap();
    assert_eq!(records.len(), 3);
    let top = records.last().unwrap();
    assert_eq!(top.accuracy_level, 1000);
    assert!(top.delta_abs.iter().all(|d| *d == 0.0));
    assert!(top.delta_rel.iter().all(|d| *d == 0.0));

    // Last sample has a zero reference.
    assert!(records[0].delta_rel[2].is_nan());
    assert!((records[0].delta_abs[1] - (0.001 - 0.1)).abs() < 1e-12);
}

#[test]
fn kubo_toyabe_limits() {
    for gamma in [1e9, 1e11, 5e12] {
        assert_eq!(kubo_toyabe(0.0, gamma), 1.0);
        assert!((kubo_toyabe(1e-2, gamma) - 1.0 / 3.0).abs() < 1e-9);
    }
}
