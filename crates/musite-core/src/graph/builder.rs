use crate::domain::config::SweepSpec;
use crate::domain::site::{SiteId, SiteSet};

use super::{Leaf, LeafId, ReferenceCall, SweepPoint, TaskGraph};

/// Build the polarization graph for `sites`.
///
/// Per site: one production point per field at the highest accuracy level and
/// one reference call. If `sweep.run_convergence_for_anchor` is set and
/// `anchor` names a site of the set, that site additionally gets one
/// convergence probe per accuracy level at the reference field.
pub fn build_graph(sites: &SiteSet, sweep: &SweepSpec, anchor: Option<&SiteId>) -> TaskGraph {
    let anchor = anchor.filter(|id| sites.get(id).is_some()).cloned();
    let production_level = sweep.production_level();
    let mut leaves = Vec::new();
    let mut next = 0u32;
    let mut id = || {
        let leaf = LeafId(next);
        next += 1;
        leaf
    };

    for site in sites {
        for &field in &sweep.fields {
            leaves.push(Leaf::Sweep(SweepPoint {
                leaf: id(),
                site_id: site.id.clone(),
                field,
                field_direction: sweep.field_direction,
                accuracy_level: production_level,
                is_convergence_probe: false,
            }));
        }

        if sweep.run_convergence_for_anchor && anchor.as_ref() == Some(&site.id) {
            for &level in &sweep.accuracy_levels {
                leaves.push(Leaf::Sweep(SweepPoint {
                    leaf: id(),
                    site_id: site.id.clone(),
                    field: sweep.reference_field,
                    field_direction: sweep.field_direction,
                    accuracy_level: level,
                    is_convergence_probe: true,
                }));
            }
        }

        leaves.push(Leaf::Reference(ReferenceCall {
            leaf: id(),
            site_id: site.id.clone(),
        }));
    }

    TaskGraph { anchor, leaves }
}
