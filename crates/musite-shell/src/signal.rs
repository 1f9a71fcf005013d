//! Signal simulation backed by an external solver command.
//!
//! Each call gets a fresh scratch directory holding `structure.json`. The
//! command is expected to leave `results.json` there: a list with one entry
//! per isotope cluster,
//!
//! ```json
//! [{"t": [0.0, 2e-8], "cluster_isotopes": {"63Cu": 4}, "spins": {"63Cu": 1.5},
//!   "probability": 0.23, "signal_z_lf": [1.0, 0.99], "signal_powder_lf": [1.0, 0.99]}]
//! ```
//!
//! with times in seconds. Series are keyed `signal_<direction>_<lf|tf>`; only
//! the keys matching the requested field direction class are read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;

use musite_core::{
    ConfigurationSignal, FieldDirectionClass, IsotopeConfiguration, SampleDirection, ServiceError,
    SignalRecord, SignalSimulationService, SimulationRequest,
};

use crate::runner::{run_command, CommandSpec};
use crate::template::TemplateVars;
use crate::{command_error, scratch_dir, SIGNAL_SERVICE};

pub const RESULTS_FILE: &str = "results.json";
pub const STRUCTURE_FILE: &str = "structure.json";

#[derive(Debug, Deserialize)]
struct ClusterResult {
    t: Vec<f64>,
    #[serde(default)]
    cluster_isotopes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    spins: BTreeMap<String, f64>,
    probability: f64,
    #[serde(flatten)]
    series: BTreeMap<String, serde_json::Value>,
}

/// Key of a cluster without spinful nuclei. It is a real configuration and
/// takes part in averaging; only an empty key marks a sentinel.
pub const EMPTY_CLUSTER_KEY: &str = "none";

/// Composition key from an isotope-count map, e.g. `63Cu:3,65Cu:1`.
fn composition_key(isotopes: &BTreeMap<String, serde_json::Value>) -> String {
    if isotopes.is_empty() {
        return EMPTY_CLUSTER_KEY.to_string();
    }
    isotopes
        .iter()
        .map(|(isotope, count)| format!("{isotope}:{count}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse solver output into a [`SignalRecord`] with times in µs.
pub fn parse_results(text: &str, field_direction: FieldDirectionClass) -> anyhow::Result<SignalRecord> {
    let clusters: Vec<ClusterResult> =
        serde_json::from_str(text).context("results are not a list of cluster entries")?;
    let Some(first) = clusters.first() else {
        bail!("results contain no clusters");
    };
    let times_s = first.t.clone();

    let mut configurations = Vec::with_capacity(clusters.len());
    for (index, cluster) in clusters.into_iter().enumerate() {
        if cluster.t != times_s {
            bail!("cluster {index} has a different time axis than cluster 0");
        }
        let mut signals = BTreeMap::new();
        for direction in SampleDirection::ALL {
            let key = format!("signal_{}_{}", direction.as_str(), field_direction.tag());
            if let Some(value) = cluster.series.get(&key) {
                let series: Vec<f64> = serde_json::from_value(value.clone())
                    .with_context(|| format!("cluster {index}: {key} is not a numeric series"))?;
                signals.insert(direction, series);
            }
        }
        configurations.push(ConfigurationSignal {
            configuration: IsotopeConfiguration {
                composition_key: composition_key(&cluster.cluster_isotopes),
                spins: cluster.spins,
                probability: cluster.probability,
            },
            signals,
        });
    }

    Ok(SignalRecord {
        times: times_s.iter().map(|t| t * 1e6).collect(),
        configurations,
    })
}

/// [`SignalSimulationService`] that runs one solver process per call.
///
/// Placeholders: `{structure}`, `{field}` (Tesla), `{accuracy}`,
/// `{field_direction}` (`lf`/`tf`), `{workdir}`.
#[derive(Debug, Clone)]
pub struct ShellSignalService {
    command: CommandSpec,
    scratch_root: Option<PathBuf>,
}

impl ShellSignalService {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            scratch_root: None,
        }
    }

    /// Create per-call scratch directories under `root` instead of the
    /// system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn read_results(workdir: &Path, field_direction: FieldDirectionClass) -> anyhow::Result<SignalRecord> {
        let path = workdir.join(RESULTS_FILE);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_results(&text, field_direction)
    }
}

#[async_trait]
impl SignalSimulationService for ShellSignalService {
    async fn simulate(&self, request: &SimulationRequest) -> Result<SignalRecord, ServiceError> {
        let dir = scratch_dir(self.scratch_root.as_deref(), "musite-sim-", SIGNAL_SERVICE)?;
        let structure_path = dir.path().join(STRUCTURE_FILE);
        let body = serde_json::to_vec_pretty(&request.structure)
            .map_err(|e| ServiceError::failed(SIGNAL_SERVICE, e.to_string()))?;
        tokio::fs::write(&structure_path, body)
            .await
            .map_err(|e| ServiceError::failed(SIGNAL_SERVICE, e.to_string()))?;

        let mut vars = TemplateVars::new();
        vars.insert("structure", structure_path.display().to_string());
        vars.insert("field", request.field.to_string());
        vars.insert("accuracy", request.accuracy_level.to_string());
        vars.insert("field_direction", request.field_direction.tag().to_string());
        vars.insert("workdir", dir.path().display().to_string());

        let output = run_command(&self.command, &vars, dir.path())
            .await
            .map_err(|e| command_error(SIGNAL_SERVICE, e))?;
        if !output.success {
            return Err(ServiceError::failed(
                SIGNAL_SERVICE,
                format!(
                    "{} exited with code {}: {}",
                    self.command.program,
                    output.exit_code,
                    output.stderr_tail(5)
                ),
            ));
        }
        tracing::debug!(
            program = %self.command.program,
            field = request.field,
            accuracy = request.accuracy_level,
            duration_ms = output.duration_ms,
            "solver finished"
        );

        Self::read_results(dir.path(), request.field_direction)
            .map_err(|e| ServiceError::invalid_output(SIGNAL_SERVICE, format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use musite_core::aggregate::aggregate;
    use musite_core::{RawSignal, SiteId};

    const TWO_CLUSTERS: &str = r#"[
        {"t": [0.0, 1e-6, 2e-6], "cluster_isotopes": {"65Cu": 1, "63Cu": 3},
         "spins": {"63Cu": 1.5, "65Cu": 1.5}, "probability": 0.6,
         "signal_z_lf": [1.0, 0.9, 0.8], "signal_z_tf": [1.0, 0.0, -1.0],
         "signal_powder_lf": [1.0, 0.95, 0.9]},
        {"t": [0.0, 1e-6, 2e-6], "cluster_isotopes": {},
         "spins": {}, "probability": 0.4,
         "signal_z_lf": [1.0, 1.0, 1.0]}
    ]"#;

    #[test]
    fn test_parse_converts_times_and_keys() {
        let record = parse_results(TWO_CLUSTERS, FieldDirectionClass::Longitudinal).unwrap();
        assert_eq!(record.times, vec![0.0, 1.0, 2.0]);
        assert_eq!(record.configurations.len(), 2);

        let first = &record.configurations[0];
        assert_eq!(first.configuration.composition_key, "63Cu:3,65Cu:1");
        assert_eq!(first.configuration.spins["63Cu"], 1.5);
        assert_eq!(first.signals.len(), 2);
        assert_eq!(first.signals[&SampleDirection::Z], vec![1.0, 0.9, 0.8]);

        let empty = &record.configurations[1].configuration;
        assert_eq!(empty.composition_key, EMPTY_CLUSTER_KEY);
        assert!(!empty.is_sentinel());
    }

    #[test]
    fn test_cluster_without_isotopes_is_averaged() {
        let text = r#"[
            {"t": [0.0, 1e-6], "cluster_isotopes": {"63Cu": 4}, "spins": {"63Cu": 1.5},
             "probability": 0.6, "signal_z_lf": [1.0, 0.5]},
            {"t": [0.0, 1e-6], "cluster_isotopes": {}, "spins": {},
             "probability": 0.4, "signal_z_lf": [1.0, 1.0]}
        ]"#;
        let record = parse_results(text, FieldDirectionClass::Longitudinal).unwrap();
        let raw = RawSignal {
            site_id: SiteId::new("1"),
            field: 0.0,
            field_direction: FieldDirectionClass::Longitudinal,
            accuracy_level: 1000,
            record,
        };

        let z = aggregate(&raw, &[SampleDirection::Z]).unwrap();

        let values = &z[0].series.values;
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!((values[1] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_parse_picks_field_direction_class() {
        let record = parse_results(TWO_CLUSTERS, FieldDirectionClass::Transverse).unwrap();
        let first = &record.configurations[0];
        assert_eq!(first.signals.len(), 1);
        assert_eq!(first.signals[&SampleDirection::Z], vec![1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_parse_rejects_bad_output() {
        assert!(parse_results("[]", FieldDirectionClass::Longitudinal).is_err());
        assert!(parse_results("{\"t\": []}", FieldDirectionClass::Longitudinal).is_err());

        let skewed = r#"[
            {"t": [0.0, 1e-6], "probability": 0.5, "signal_z_lf": [1.0, 1.0]},
            {"t": [0.0, 2e-6], "probability": 0.5, "signal_z_lf": [1.0, 1.0]}
        ]"#;
        let err = parse_results(skewed, FieldDirectionClass::Longitudinal).unwrap_err();
        assert!(err.to_string().contains("time axis"));
    }
}
