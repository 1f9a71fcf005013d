//! Built-in nuclear isotope data for the second-moment estimate.
//!
//! Only isotopes with non-zero spin are listed; spinless isotopes do not
//! contribute to the dipolar field. Abundances are natural abundances in
//! percent, `g` is the nuclear g-factor (μ / (I μN)).

/// One magnetic isotope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Isotope {
    pub symbol: &'static str,
    pub mass_number: u16,
    /// Natural abundance, percent.
    pub abundance: f64,
    pub spin: f64,
    pub g_factor: f64,
}

const fn iso(symbol: &'static str, mass_number: u16, abundance: f64, spin: f64, g_factor: f64) -> Isotope {
    Isotope {
        symbol,
        mass_number,
        abundance,
        spin,
        g_factor,
    }
}

static ISOTOPES: &[Isotope] = &[
    iso("H", 1, 99.9885, 0.5, 5.585694),
    iso("H", 2, 0.0115, 1.0, 0.857438),
    iso("Li", 6, 7.59, 1.0, 0.822047),
    iso("Li", 7, 92.41, 1.5, 2.170951),
    iso("B", 10, 19.9, 3.0, 0.600215),
    iso("B", 11, 80.1, 1.5, 1.792433),
    iso("C", 13, 1.07, 0.5, 1.404824),
    iso("N", 14, 99.636, 1.0, 0.403761),
    iso("N", 15, 0.364, 0.5, -0.566378),
    iso("O", 17, 0.038, 2.5, -0.757516),
    iso("F", 19, 100.0, 0.5, 5.257736),
    iso("Na", 23, 100.0, 1.5, 1.478348),
    iso("Mg", 25, 10.0, 2.5, -0.34218),
    iso("Al", 27, 100.0, 2.5, 1.456601),
    iso("Si", 29, 4.685, 0.5, -1.11058),
    iso("P", 31, 100.0, 0.5, 2.26320),
    iso("Cl", 35, 75.76, 1.5, 0.547916),
    iso("Cl", 37, 24.24, 1.5, 0.456082),
    iso("K", 39, 93.2581, 1.5, 0.26098),
    iso("K", 41, 6.7302, 1.5, 0.143247),
    iso("V", 50, 0.25, 6.0, 0.5576),
    iso("V", 51, 99.75, 3.5, 1.47106),
    iso("Mn", 55, 100.0, 2.5, 1.3819),
    iso("Fe", 57, 2.119, 0.5, 0.18125),
    iso("Co", 59, 100.0, 3.5, 1.322),
    iso("Cu", 63, 69.15, 1.5, 1.4824),
    iso("Cu", 65, 30.85, 1.5, 1.5878),
    iso("Zn", 67, 4.1, 2.5, 0.350192),
    iso("Ga", 69, 60.108, 1.5, 1.34439),
    iso("Ga", 71, 39.892, 1.5, 1.70818),
    iso("Nb", 93, 100.0, 4.5, 1.3712),
    iso("Ag", 107, 51.839, 0.5, -0.22714),
    iso("Ag", 109, 48.161, 0.5, -0.26112),
    iso("Sn", 115, 0.34, 0.5, -1.8377),
    iso("Sn", 117, 7.68, 0.5, -2.00208),
    iso("Sn", 119, 8.59, 0.5, -2.09456),
    iso("Pt", 195, 33.832, 0.5, 1.2190),
];

/// Magnetic isotopes of `symbol`; empty for unknown or spinless elements.
pub fn isotopes_of(symbol: &str) -> impl Iterator<Item = &'static Isotope> + '_ {
    ISOTOPES.iter().filter(move |i| i.symbol == symbol)
}

pub fn is_known(symbol: &str) -> bool {
    ISOTOPES.iter().any(|i| i.symbol == symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copper_has_two_isotopes() {
        let cu: Vec<_> = isotopes_of("Cu").collect();
        assert_eq!(cu.len(), 2);
        let total: f64 = cu.iter().map(|i| i.abundance).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_element() {
        assert!(!is_known("Xx"));
        assert_eq!(isotopes_of("Xx").count(), 0);
    }
}
