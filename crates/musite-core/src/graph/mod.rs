//! Task graph: the polarization workflow as plain data.
//!
//! A [`TaskGraph`] is produced by [`build_graph`], a pure function of the site
//! set and the normalized sweep. The executor runs it; `musite plan` prints it.

mod builder;

pub use builder::build_graph;

use serde::{Deserialize, Serialize};

use crate::domain::signal::FieldDirectionClass;
use crate::domain::site::SiteId;

/// Identifies one leaf within a graph. Ids are dense, in build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeafId(pub u32);

impl std::fmt::Display for LeafId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "leaf-{}", self.0)
    }
}

/// One signal-simulation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub leaf: LeafId,
    pub site_id: SiteId,
    /// Tesla.
    pub field: f64,
    pub field_direction: FieldDirectionClass,
    pub accuracy_level: u64,
    pub is_convergence_probe: bool,
}

/// One closed-form reference evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCall {
    pub leaf: LeafId,
    pub site_id: SiteId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Leaf {
    Sweep(SweepPoint),
    Reference(ReferenceCall),
}

impl Leaf {
    pub fn id(&self) -> LeafId {
        match self {
            Leaf::Sweep(p) => p.leaf,
            Leaf::Reference(r) => r.leaf,
        }
    }

    /// Group tag: the site the leaf belongs to.
    pub fn site_id(&self) -> &SiteId {
        match self {
            Leaf::Sweep(p) => &p.site_id,
            Leaf::Reference(r) => &r.site_id,
        }
    }
}

/// Serializable description of the polarization workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub anchor: Option<SiteId>,
    pub leaves: Vec<Leaf>,
}

impl TaskGraph {
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn sweep_points(&self) -> impl Iterator<Item = &SweepPoint> {
        self.leaves.iter().filter_map(|l| match l {
            Leaf::Sweep(p) => Some(p),
            Leaf::Reference(_) => None,
        })
    }

    pub fn reference_calls(&self) -> impl Iterator<Item = &ReferenceCall> {
        self.leaves.iter().filter_map(|l| match l {
            Leaf::Reference(r) => Some(r),
            Leaf::Sweep(_) => None,
        })
    }

    /// Leaves tagged with `site`.
    pub fn group<'a>(&'a self, site: &'a SiteId) -> impl Iterator<Item = &'a Leaf> + 'a {
        self.leaves.iter().filter(move |l| l.site_id() == site)
    }
}
