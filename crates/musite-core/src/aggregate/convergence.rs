//! Convergence deltas across accuracy levels.

use crate::domain::error::AggregationError;
use crate::domain::signal::{AggregatedSignal, ConvergenceRecord};

/// Compare every rung of a convergence ladder against its highest accuracy
/// level.
///
/// All rungs must belong to the same site and direction and share the exact
/// same time axis; grids are never interpolated. Records come back in
/// ascending accuracy order. The reference rung compares to itself and is
/// zero everywhere; elsewhere the relative delta is NaN where the reference
/// value is zero.
pub fn convergence_deltas(
    site_id: &str,
    ladder: &[AggregatedSignal],
) -> Result<Vec<ConvergenceRecord>, AggregationError> {
    let reference = ladder
        .iter()
        .max_by_key(|s| s.accuracy_level)
        .ok_or_else(|| AggregationError::EmptyLadder {
            site_id: site_id.to_string(),
        })?;

    let mut rungs: Vec<&AggregatedSignal> = ladder.iter().collect();
    rungs.sort_by_key(|s| s.accuracy_level);

    let mut records = Vec::with_capacity(rungs.len());
    for rung in rungs {
        if rung.series.times != reference.series.times
            || rung.series.values.len() != reference.series.values.len()
        {
            return Err(AggregationError::MisalignedTimeGrid {
                site_id: rung.site_id.to_string(),
                accuracy_level: rung.accuracy_level,
            });
        }

        let is_reference = rung.accuracy_level == reference.accuracy_level;
        let (delta_abs, delta_rel) = if is_reference {
            let zeros = vec![0.0; rung.series.values.len()];
            (zeros.clone(), zeros)
        } else {
            let abs: Vec<f64> = reference
                .series
                .values
                .iter()
                .zip(&rung.series.values)
                .map(|(r, s)| r - s)
                .collect();
            let rel = abs
                .iter()
                .zip(&reference.series.values)
                .map(|(d, r)| if *r == 0.0 { f64::NAN } else { 100.0 * d / r })
                .collect();
            (abs, rel)
        };

        records.push(ConvergenceRecord {
            site_id: rung.site_id.clone(),
            field: rung.field,
            direction: rung.direction,
            accuracy_level: rung.accuracy_level,
            delta_abs,
            delta_rel,
        });
    }
    Ok(records)
}
