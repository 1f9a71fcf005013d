//! Run configuration and its validation into a [`RunPlan`].
//!
//! Validation happens before a run is created: a [`RunPlan`] can only be
//! obtained through [`RunConfig::validate`], so the orchestrator never sees an
//! invalid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::{MusiteError, Result, ValidationError};
use crate::domain::signal::{FieldDirectionClass, SampleDirection};
use crate::domain::site::AnchorPolicy;
use crate::domain::structure::{Structure, DEFAULT_IMPURITY_SYMBOL};

/// Unit of the configured field values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldUnit {
    #[default]
    Tesla,
    #[serde(alias = "mT")]
    Millitesla,
}

impl FieldUnit {
    pub fn to_tesla(&self, value: f64) -> f64 {
        match self {
            FieldUnit::Tesla => value,
            FieldUnit::Millitesla => value * 1e-3,
        }
    }
}

/// How leaf failures propagate to the polarization phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failed leaf fails the whole phase.
    #[default]
    WholeGraph,
    /// A failed leaf drops its site only; the phase fails if no site survives.
    PerSite,
}

/// Parameters handed through to the site-search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSearchParams {
    /// Supercell matrix; `None` lets the service choose one.
    pub supercell: Option<[[i64; 3]; 3]>,
    /// Spacing of the trial-position grid, Å.
    pub mu_spacing: f64,
    pub kpoints_distance: f64,
    /// `true` for a charged muon, `false` for muonium.
    pub charge_supercell: bool,
    pub magmoms: Option<Vec<f64>>,
    /// Opaque extra inputs, passed through verbatim.
    pub extra: serde_json::Value,
}

impl Default for SiteSearchParams {
    fn default() -> Self {
        Self {
            supercell: None,
            mu_spacing: 1.0,
            kpoints_distance: 0.301,
            charge_supercell: true,
            magmoms: None,
            extra: serde_json::Value::Null,
        }
    }
}

impl SiteSearchParams {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !(self.mu_spacing.is_finite() && self.mu_spacing > 0.0) {
            return Err(ValidationError::InvalidSiteSearch {
                field: "mu_spacing".to_string(),
                reason: format!("must be positive, got {}", self.mu_spacing),
            });
        }
        if !(self.kpoints_distance.is_finite() && self.kpoints_distance > 0.0) {
            return Err(ValidationError::InvalidSiteSearch {
                field: "kpoints_distance".to_string(),
                reason: format!("must be positive, got {}", self.kpoints_distance),
            });
        }
        if let Some(sc) = &self.supercell {
            let reason = match determinant(sc) {
                Some(0) => Some("matrix is singular"),
                Some(_) => None,
                None => Some("entries are too large"),
            };
            if let Some(reason) = reason {
                return Err(ValidationError::InvalidSiteSearch {
                    field: "supercell".to_string(),
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Exact determinant, or `None` when it does not fit in i128. Cofactors of
/// i64 entries always fit; only the outer products can overflow.
fn determinant(m: &[[i64; 3]; 3]) -> Option<i128> {
    let e = |r: usize, c: usize| i128::from(m[r][c]);
    let minor0 = e(1, 1) * e(2, 2) - e(1, 2) * e(2, 1);
    let minor1 = e(1, 0) * e(2, 2) - e(1, 2) * e(2, 0);
    let minor2 = e(1, 0) * e(2, 1) - e(1, 1) * e(2, 0);
    e(0, 0)
        .checked_mul(minor0)?
        .checked_sub(e(0, 1).checked_mul(minor1)?)?
        .checked_add(e(0, 2).checked_mul(minor2)?)
}

/// Field/accuracy sweep parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarizationParams {
    pub fields: Vec<f64>,
    pub field_unit: FieldUnit,
    pub field_direction: FieldDirectionClass,
    pub accuracy_levels: Vec<u64>,
    pub run_convergence_for_anchor: bool,
    pub sample_directions: Vec<SampleDirection>,
    pub convergence_direction: SampleDirection,
    /// Field of the convergence ladder, in Tesla.
    pub reference_field: f64,
    pub anchor_policy: AnchorPolicy,
    pub failure_policy: FailurePolicy,
    pub max_concurrent: usize,
}

impl Default for PolarizationParams {
    fn default() -> Self {
        Self {
            fields: vec![0.0],
            field_unit: FieldUnit::Tesla,
            field_direction: FieldDirectionClass::Longitudinal,
            accuracy_levels: vec![100, 10_000, 1_000_000],
            run_convergence_for_anchor: false,
            sample_directions: SampleDirection::ALL.to_vec(),
            convergence_direction: SampleDirection::Z,
            reference_field: 0.0,
            anchor_policy: AnchorPolicy::FirstDiscovered,
            failure_policy: FailurePolicy::WholeGraph,
            max_concurrent: 8,
        }
    }
}

/// Kubo-Toyabe reference-curve parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceParams {
    pub cutoff_angstrom: f64,
    /// Per-element cutoff overrides, Å.
    pub cutoff_overrides: BTreeMap<String, f64>,
    pub time_max_us: f64,
    pub samples: usize,
    pub impurity_symbol: String,
}

impl Default for ReferenceParams {
    fn default() -> Self {
        Self {
            cutoff_angstrom: 40.0,
            cutoff_overrides: BTreeMap::new(),
            time_max_us: 20.0,
            samples: 1000,
            impurity_symbol: DEFAULT_IMPURITY_SYMBOL.to_string(),
        }
    }
}

impl ReferenceParams {
    pub fn cutoff_for(&self, symbol: &str) -> f64 {
        self.cutoff_overrides
            .get(symbol)
            .copied()
            .unwrap_or(self.cutoff_angstrom)
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let bad_cutoff = std::iter::once(self.cutoff_angstrom)
            .chain(self.cutoff_overrides.values().copied())
            .any(|c| !(c.is_finite() && c > 0.0));
        if bad_cutoff {
            return Err(ValidationError::InvalidReference {
                field: "cutoff_angstrom".to_string(),
                reason: "cutoffs must be positive".to_string(),
            });
        }
        if !(self.time_max_us.is_finite() && self.time_max_us > 0.0) {
            return Err(ValidationError::InvalidReference {
                field: "time_max_us".to_string(),
                reason: format!("must be positive, got {}", self.time_max_us),
            });
        }
        if self.samples < 2 {
            return Err(ValidationError::InvalidReference {
                field: "samples".to_string(),
                reason: "at least two samples are required".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything about a run except the input structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub do_implant: bool,
    pub do_polarization: bool,
    pub site_search: SiteSearchParams,
    pub polarization: PolarizationParams,
    pub reference: ReferenceParams,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            do_implant: true,
            do_polarization: true,
            site_search: SiteSearchParams::default(),
            polarization: PolarizationParams::default(),
            reference: ReferenceParams::default(),
        }
    }
}

impl RunOptions {
    /// Load options from a `.toml` or `.json` file (by extension).
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text).map_err(|e| MusiteError::Config(e.to_string())),
            Some("json") => Ok(serde_json::from_str(&text)?),
            other => Err(MusiteError::Config(format!(
                "unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// A run request: input structure plus options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub structure: Structure,
    #[serde(flatten)]
    pub options: RunOptions,
}

/// Normalized sweep: fields in Tesla, deduplicated in input order; accuracy
/// levels ascending and deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    pub fields: Vec<f64>,
    pub field_direction: FieldDirectionClass,
    pub accuracy_levels: Vec<u64>,
    pub run_convergence_for_anchor: bool,
    pub reference_field: f64,
}

impl SweepSpec {
    /// Sweep of a run with polarization disabled: no fields, no levels.
    fn idle(pol: &PolarizationParams) -> Self {
        Self {
            fields: Vec::new(),
            field_direction: pol.field_direction,
            accuracy_levels: Vec::new(),
            run_convergence_for_anchor: false,
            reference_field: pol.reference_field,
        }
    }

    /// Accuracy level of the production sweep.
    pub fn production_level(&self) -> u64 {
        self.accuracy_levels.last().copied().unwrap_or_default()
    }
}

/// A validated run configuration. Only [`RunConfig::validate`] creates one.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub structure: Structure,
    pub do_implant: bool,
    pub do_polarization: bool,
    pub site_search: SiteSearchParams,
    pub sweep: SweepSpec,
    pub sample_directions: Vec<SampleDirection>,
    pub convergence_direction: SampleDirection,
    pub anchor_policy: AnchorPolicy,
    pub failure_policy: FailurePolicy,
    pub max_concurrent: usize,
    pub reference: ReferenceParams,
}

impl RunConfig {
    pub fn new(structure: Structure, options: RunOptions) -> Self {
        Self { structure, options }
    }

    /// Validate and normalize.
    pub fn validate(self) -> std::result::Result<RunPlan, ValidationError> {
        let RunConfig { structure, options } = self;
        if structure.atoms.is_empty() {
            return Err(ValidationError::EmptyStructure);
        }
        if options.do_implant {
            options.site_search.validate()?;
        }

        let pol = options.polarization;
        let (sweep, sample_directions) = if options.do_polarization {
            options.reference.validate()?;
            let sweep = normalize_sweep(&pol)?;
            let directions = normalize_directions(&pol)?;
            if pol.max_concurrent == 0 {
                return Err(ValidationError::ZeroConcurrency);
            }
            // An already-implanted structure must carry its impurity.
            if !options.do_implant {
                structure.impurity(&options.reference.impurity_symbol)?;
            }
            (sweep, directions)
        } else {
            (SweepSpec::idle(&pol), Vec::new())
        };

        Ok(RunPlan {
            structure,
            do_implant: options.do_implant,
            do_polarization: options.do_polarization,
            site_search: options.site_search,
            sweep,
            sample_directions,
            convergence_direction: pol.convergence_direction,
            anchor_policy: pol.anchor_policy,
            failure_policy: pol.failure_policy,
            max_concurrent: pol.max_concurrent,
            reference: options.reference,
        })
    }
}

fn normalize_directions(
    pol: &PolarizationParams,
) -> std::result::Result<Vec<SampleDirection>, ValidationError> {
    let mut directions: Vec<SampleDirection> = Vec::new();
    for d in &pol.sample_directions {
        if !directions.contains(d) {
            directions.push(*d);
        }
    }
    if directions.is_empty() {
        return Err(ValidationError::EmptyDirections);
    }
    if !directions.contains(&pol.convergence_direction) {
        directions.push(pol.convergence_direction);
    }
    Ok(directions)
}

fn normalize_sweep(pol: &PolarizationParams) -> std::result::Result<SweepSpec, ValidationError> {
    if pol.fields.is_empty() {
        return Err(ValidationError::EmptyFields);
    }
    let mut fields: Vec<f64> = Vec::with_capacity(pol.fields.len());
    for &raw in &pol.fields {
        if !(raw.is_finite() && raw >= 0.0) {
            return Err(ValidationError::InvalidField { value: raw });
        }
        let tesla = pol.field_unit.to_tesla(raw);
        if !fields.iter().any(|f| (f - tesla).abs() <= 1e-12) {
            fields.push(tesla);
        }
    }

    let reference_field = pol.reference_field;
    if !(reference_field.is_finite() && reference_field >= 0.0) {
        return Err(ValidationError::InvalidField {
            value: reference_field,
        });
    }

    if pol.accuracy_levels.is_empty() {
        return Err(ValidationError::EmptyAccuracyLevels);
    }
    if let Some(&zero) = pol.accuracy_levels.iter().find(|&&l| l == 0) {
        return Err(ValidationError::InvalidAccuracyLevel { value: zero });
    }
    let mut accuracy_levels = pol.accuracy_levels.clone();
    accuracy_levels.sort_unstable();
    accuracy_levels.dedup();

    Ok(SweepSpec {
        fields,
        field_direction: pol.field_direction,
        accuracy_levels,
        run_convergence_for_anchor: pol.run_convergence_for_anchor,
        reference_field,
    })
}
