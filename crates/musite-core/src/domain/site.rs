//! Candidate impurity sites and the per-run site set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::error::ValidationError;
use crate::domain::structure::Structure;

/// Id given to the single site synthesized from an already-implanted input.
pub const SYNTHESIZED_SITE_ID: &str = "0";

/// Identifies a site within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub String);

impl SiteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A candidate stopping site: relaxed structure plus total energy (eV).
///
/// `energy` is `None` for a site that did not come out of a site search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub structure: Structure,
    pub energy: Option<f64>,
}

impl Site {
    pub fn new(id: impl Into<String>, structure: Structure, energy: Option<f64>) -> Self {
        Self {
            id: SiteId::new(id),
            structure,
            energy,
        }
    }
}

/// Rule used to designate the anchor site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// First site in enumeration order.
    #[default]
    FirstDiscovered,
    /// Lowest energy; ties and energy-less sites fall back to enumeration order.
    LowestEnergy,
}

/// One row of the site ranking: energy relative to the lowest site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSummary {
    pub id: SiteId,
    pub energy: Option<f64>,
    /// `energy - min(energy)` in meV; `None` for sites without energy.
    pub delta_energy_mev: Option<f64>,
}

/// Ordered, id-unique collection of sites for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteSet {
    sites: Vec<Site>,
}

impl SiteSet {
    /// Build a site set, keeping enumeration order. Duplicate ids are rejected.
    pub fn new(sites: Vec<Site>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for site in &sites {
            if !seen.insert(site.id.clone()) {
                return Err(ValidationError::DuplicateSiteId {
                    id: site.id.to_string(),
                });
            }
        }
        Ok(Self { sites })
    }

    /// The single-entry set used when the input structure is already implanted.
    pub fn synthesized(structure: Structure) -> Self {
        Self {
            sites: vec![Site::new(SYNTHESIZED_SITE_ID, structure, None)],
        }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Site> {
        self.sites.iter()
    }

    pub fn get(&self, id: &SiteId) -> Option<&Site> {
        self.sites.iter().find(|s| &s.id == id)
    }

    /// Pick the anchor according to `policy`. `None` only for an empty set.
    pub fn anchor(&self, policy: AnchorPolicy) -> Option<&Site> {
        match policy {
            AnchorPolicy::FirstDiscovered => self.sites.first(),
            AnchorPolicy::LowestEnergy => {
                let mut best: Option<&Site> = None;
                for site in &self.sites {
                    best = match (best, site.energy) {
                        (None, _) => Some(site),
                        (Some(b), Some(e)) => match b.energy {
                            Some(be) if be <= e => Some(b),
                            _ => Some(site),
                        },
                        (Some(b), None) => Some(b),
                    };
                }
                best
            }
        }
    }

    /// Sites sorted by ascending energy with ΔE relative to the minimum.
    pub fn ranking(&self) -> Vec<SiteSummary> {
        let min = self
            .sites
            .iter()
            .filter_map(|s| s.energy)
            .fold(f64::INFINITY, f64::min);

        let mut rows: Vec<SiteSummary> = self
            .sites
            .iter()
            .map(|s| SiteSummary {
                id: s.id.clone(),
                energy: s.energy,
                delta_energy_mev: s.energy.map(|e| (e - min) * 1e3),
            })
            .collect();

        // Stable sort keeps enumeration order among equal energies.
        rows.sort_by(|a, b| match (a.energy, b.energy) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        rows
    }
}

impl<'a> IntoIterator for &'a SiteSet {
    type Item = &'a Site;
    type IntoIter = std::slice::Iter<'a, Site>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::structure::Atom;

    fn structure(label: &str) -> Structure {
        Structure::new(label, None, vec![Atom::new("H", [0.0, 0.0, 0.0])])
    }

    fn site(id: &str, energy: Option<f64>) -> Site {
        Site::new(id, structure(id), energy)
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let res = SiteSet::new(vec![site("1", Some(-1.0)), site("1", Some(-2.0))]);
        assert!(matches!(res, Err(ValidationError::DuplicateSiteId { .. })));
    }

    #[test]
    fn test_first_discovered_anchor_keeps_enumeration_order() {
        let set = SiteSet::new(vec![site("5", Some(-1.0)), site("2", Some(-3.0))]).unwrap();
        assert_eq!(set.anchor(AnchorPolicy::FirstDiscovered).unwrap().id.as_str(), "5");
    }

    #[test]
    fn test_lowest_energy_anchor() {
        let set = SiteSet::new(vec![
            site("a", Some(-1.0)),
            site("b", None),
            site("c", Some(-3.0)),
            site("d", Some(-3.0)),
        ])
        .unwrap();
        assert_eq!(set.anchor(AnchorPolicy::LowestEnergy).unwrap().id.as_str(), "c");
    }

    #[test]
    fn test_lowest_energy_anchor_without_energies_falls_back_to_first() {
        let set = SiteSet::synthesized(structure("in"));
        assert_eq!(
            set.anchor(AnchorPolicy::LowestEnergy).unwrap().id.as_str(),
            SYNTHESIZED_SITE_ID
        );
        assert!(SiteSet::default().anchor(AnchorPolicy::FirstDiscovered).is_none());
    }

    #[test]
    fn test_ranking_sorted_with_delta_in_mev() {
        let set = SiteSet::new(vec![
            site("1", Some(-100.010)),
            site("2", Some(-100.050)),
            site("3", None),
        ])
        .unwrap();
        let rows = set.ranking();
        assert_eq!(rows[0].id.as_str(), "2");
        assert_eq!(rows[0].delta_energy_mev, Some(0.0));
        assert_eq!(rows[1].id.as_str(), "1");
        assert!((rows[1].delta_energy_mev.unwrap() - 40.0).abs() < 1e-6);
        assert_eq!(rows[2].id.as_str(), "3");
        assert!(rows[2].delta_energy_mev.is_none());
    }
}
