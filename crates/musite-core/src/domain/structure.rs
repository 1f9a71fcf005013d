//! Crystal structure handle.
//!
//! The orchestration layers treat a [`Structure`] as opaque: they use its
//! content key and the impurity marker only. The geometry is read by the
//! reference-function module.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::ValidationError;

/// Element symbol used for the implanted impurity when none is configured.
pub const DEFAULT_IMPURITY_SYMBOL: &str = "H";

/// A single atom: element symbol and Cartesian position in Å.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub symbol: String,
    pub position: [f64; 3],
}

impl Atom {
    pub fn new(symbol: impl Into<String>, position: [f64; 3]) -> Self {
        Self {
            symbol: symbol.into(),
            position,
        }
    }
}

/// Content-derived identity of a structure (SHA-256 over canonical JSON).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureKey(pub String);

impl StructureKey {
    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for StructureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Atomic geometry exchanged with the external services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// Free-form label (formula, file stem, ...).
    #[serde(default)]
    pub label: String,

    /// Lattice row vectors in Å; `None` for a non-periodic cluster.
    #[serde(default)]
    pub lattice: Option<[[f64; 3]; 3]>,

    pub atoms: Vec<Atom>,

    /// Index of the impurity atom. When absent, the last atom carrying the
    /// impurity symbol is used.
    #[serde(default)]
    pub impurity_index: Option<usize>,
}

impl Structure {
    pub fn new(label: impl Into<String>, lattice: Option<[[f64; 3]; 3]>, atoms: Vec<Atom>) -> Self {
        Self {
            label: label.into(),
            lattice,
            atoms,
            impurity_index: None,
        }
    }

    /// Mark atom `index` as the impurity.
    pub fn with_impurity(mut self, index: usize) -> Self {
        self.impurity_index = Some(index);
        self
    }

    /// Deterministic content key.
    pub fn key(&self) -> StructureKey {
        // Field order of the derive is stable, so the JSON encoding is canonical.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        StructureKey(hex::encode(hasher.finalize()))
    }

    /// Resolve the impurity atom index.
    pub fn impurity(&self, impurity_symbol: &str) -> Result<usize, ValidationError> {
        if self.atoms.is_empty() {
            return Err(ValidationError::EmptyStructure);
        }
        match self.impurity_index {
            Some(index) if index < self.atoms.len() => Ok(index),
            Some(index) => Err(ValidationError::ImpurityIndexOutOfRange {
                index,
                atoms: self.atoms.len(),
            }),
            None => self
                .atoms
                .iter()
                .rposition(|a| a.symbol == impurity_symbol)
                .ok_or_else(|| ValidationError::MissingImpurity {
                    symbol: impurity_symbol.to_string(),
                }),
        }
    }

    pub fn is_periodic(&self) -> bool {
        self.lattice.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cu_with_muon() -> Structure {
        Structure::new(
            "Cu4H",
            Some([[3.61, 0.0, 0.0], [0.0, 3.61, 0.0], [0.0, 0.0, 3.61]]),
            vec![
                Atom::new("Cu", [0.0, 0.0, 0.0]),
                Atom::new("Cu", [1.805, 1.805, 0.0]),
                Atom::new("Cu", [1.805, 0.0, 1.805]),
                Atom::new("Cu", [0.0, 1.805, 1.805]),
                Atom::new("H", [1.805, 1.805, 1.805]),
            ],
        )
    }

    #[test]
    fn test_key_is_deterministic() {
        assert_eq!(cu_with_muon().key(), cu_with_muon().key());
        assert_eq!(cu_with_muon().key().0.len(), 64);
    }

    #[test]
    fn test_key_changes_with_geometry() {
        let mut moved = cu_with_muon();
        moved.atoms[4].position[0] += 0.1;
        assert_ne!(cu_with_muon().key(), moved.key());
    }

    #[test]
    fn test_impurity_defaults_to_last_matching_atom() {
        let s = cu_with_muon();
        assert_eq!(s.impurity(DEFAULT_IMPURITY_SYMBOL).unwrap(), 4);
    }

    #[test]
    fn test_explicit_impurity_index_wins() {
        let s = cu_with_muon().with_impurity(1);
        assert_eq!(s.impurity("H").unwrap(), 1);
    }

    #[test]
    fn test_missing_impurity_is_rejected() {
        let s = cu_with_muon();
        assert!(matches!(
            s.impurity("Li"),
            Err(ValidationError::MissingImpurity { .. })
        ));
        let s = cu_with_muon().with_impurity(9);
        assert!(matches!(
            s.impurity("H"),
            Err(ValidationError::ImpurityIndexOutOfRange { index: 9, atoms: 5 })
        ));
    }
}
