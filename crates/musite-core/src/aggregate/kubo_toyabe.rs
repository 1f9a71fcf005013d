//! Zero-field static Kubo-Toyabe reference function.
//!
//! The width Γ is the dipolar second moment at the impurity, estimated from
//! isotope-averaged nuclear moments of every non-impurity species within a
//! cutoff radius, periodic images included.

use std::collections::BTreeMap;

use tracing::debug;

use crate::aggregate::isotopes::{is_known, isotopes_of};
use crate::domain::config::ReferenceParams;
use crate::domain::error::ValidationError;
use crate::domain::signal::{ReferenceCurve, TimeSeries};
use crate::domain::site::SiteId;
use crate::domain::structure::Structure;

/// μN / ħ, rad s⁻¹ T⁻¹.
pub const MU_N_OVER_HBAR: f64 = 7.622593285e6 * 2.0 * std::f64::consts::PI;

/// (2/3)(μ0/4π)² (ħ γμ)², rescaled for distances in Å.
pub const DIPOLAR_PREFACTOR: f64 = 5.37402139e-5;

/// `KT(t) = 1/3 + 2/3 (1 - Γt²) exp(-Γt²/2)`, `t` in seconds, Γ in s⁻².
pub fn kubo_toyabe(t: f64, gamma: f64) -> f64 {
    let x = gamma * t * t;
    (1.0 + 2.0 * (1.0 - x) * (-0.5 * x).exp()) / 3.0
}

/// Second-moment contribution per species, s⁻².
pub fn second_moment_by_species(
    structure: &Structure,
    params: &ReferenceParams,
) -> Result<BTreeMap<String, f64>, ValidationError> {
    let impurity = structure.impurity(&params.impurity_symbol)?;
    let origin = structure.atoms[impurity].position;

    let mut contribs = BTreeMap::new();
    for atom in &structure.atoms {
        if atom.symbol == params.impurity_symbol || contribs.contains_key(&atom.symbol) {
            continue;
        }
        if !is_known(&atom.symbol) {
            debug!(symbol = %atom.symbol, "no magnetic isotope data; species skipped");
            contribs.insert(atom.symbol.clone(), 0.0);
            continue;
        }

        let species_avg: f64 = isotopes_of(&atom.symbol)
            .map(|i| {
                let gamma_n = MU_N_OVER_HBAR * i.g_factor;
                (i.abundance / 100.0) * i.spin * (i.spin + 1.0) * gamma_n * gamma_n
            })
            .sum();

        let cutoff = params.cutoff_for(&atom.symbol);
        let positions = structure
            .atoms
            .iter()
            .filter(|a| a.symbol == atom.symbol)
            .map(|a| a.position);
        let lattice_sum = inverse_sixth_sum(structure.lattice.as_ref(), origin, positions, cutoff);

        contribs.insert(atom.symbol.clone(), species_avg * lattice_sum * DIPOLAR_PREFACTOR);
    }
    Ok(contribs)
}

/// Total second moment Γ, s⁻².
pub fn second_moment(structure: &Structure, params: &ReferenceParams) -> Result<f64, ValidationError> {
    Ok(second_moment_by_species(structure, params)?.values().sum())
}

/// `Σ r⁻⁶` from `origin` to every image of `positions` within `cutoff` Å.
fn inverse_sixth_sum(
    lattice: Option<&[[f64; 3]; 3]>,
    origin: [f64; 3],
    positions: impl Iterator<Item = [f64; 3]>,
    cutoff: f64,
) -> f64 {
    let reps = lattice.map(|l| image_range(l, cutoff)).unwrap_or([0, 0, 0]);
    let zero = [[0.0; 3]; 3];
    let l = lattice.unwrap_or(&zero);
    let cutoff2 = cutoff * cutoff;

    let mut sum = 0.0;
    for p in positions {
        for i in -reps[0]..=reps[0] {
            for j in -reps[1]..=reps[1] {
                for k in -reps[2]..=reps[2] {
                    let (fi, fj, fk) = (i as f64, j as f64, k as f64);
                    let mut r2 = 0.0;
                    for c in 0..3 {
                        let d = p[c] + fi * l[0][c] + fj * l[1][c] + fk * l[2][c] - origin[c];
                        r2 += d * d;
                    }
                    if r2 > 1e-12 && r2 <= cutoff2 {
                        sum += 1.0 / (r2 * r2 * r2);
                    }
                }
            }
        }
    }
    sum
}

/// Images needed per lattice vector so every point within `cutoff` of the cell
/// is reached: `ceil(cutoff / height) + 1`, height being the spacing of the
/// lattice planes spanned by the other two vectors.
fn image_range(l: &[[f64; 3]; 3], cutoff: f64) -> [i64; 3] {
    let volume = dot(l[0], cross(l[1], l[2])).abs();
    let mut out = [0i64; 3];
    for (axis, slot) in out.iter_mut().enumerate() {
        let area = norm(cross(l[(axis + 1) % 3], l[(axis + 2) % 3]));
        *slot = if volume > 0.0 && area > 0.0 {
            (cutoff * area / volume).ceil() as i64 + 1
        } else {
            0
        };
    }
    out
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Evenly spaced grid of `samples` points over `[0, time_max_us]`, µs.
pub fn time_grid_us(time_max_us: f64, samples: usize) -> Vec<f64> {
    if samples < 2 {
        return vec![0.0; samples];
    }
    let step = time_max_us / (samples - 1) as f64;
    (0..samples).map(|i| i as f64 * step).collect()
}

/// Reference curve for one site, times reported in µs.
pub fn reference_curve(
    site_id: &SiteId,
    structure: &Structure,
    params: &ReferenceParams,
) -> Result<ReferenceCurve, ValidationError> {
    let gamma = second_moment(structure, params)?;
    let times = time_grid_us(params.time_max_us, params.samples);
    let values = times.iter().map(|t| kubo_toyabe(t * 1e-6, gamma)).collect();
    Ok(ReferenceCurve {
        site_id: site_id.clone(),
        gamma,
        series: TimeSeries::new(times, values),
    })
}
