//! Precomputed catalogs and conjugation tables.
//!
//! The single-qubit Clifford group C1 has 24 elements. This module fixes a
//! canonical indexing of them (breadth-first closure over the `h` and `s`
//! generators starting from the identity, which is deterministic), and builds
//! from it:
//!
//! * the 24 x 24 multiplication table and the 24-entry inverse table,
//! * the 24 unitary matrices, used when converting C1 registers to U2,
//! * for every named entangler, the tables that push Pauli and C1 elements
//!   past the gate by conjugation, with a sentinel marking C1 (x) C1 elements
//!   that do not remain local.

use std::collections::HashMap;

use itertools::iproduct;
use lazy_static::lazy_static;
use num_complex::Complex64;
use num_traits::{One, Zero};

use crate::error::{Error, Result};
use crate::tableau::{Tableau, one_qubit_gate, two_qubit_gate};

/// A 2 x 2 complex matrix stored by rows.
pub type Mat2 = [[Complex64; 2]; 2];

/// The number of single-qubit Clifford group elements.
pub const NUM_C1: usize = 24;

/// Which unitary conjugates a register when it crosses a fixed gate.
///
/// A register crossing a gate `G` rightward (from before the gate to after
/// it) is conjugated by the gate itself, `R -> G R G†`; crossing leftward it
/// is conjugated by the adjoint, `R -> G† R G`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conjugation {
    ByGate,
    ByAdjoint,
}

fn mat_mul(a: &Mat2, b: &Mat2) -> Mat2 {
    let mut out = [[Complex64::zero(); 2]; 2];
    for (row, col) in iproduct!(0..2, 0..2) {
        out[row][col] = a[row][0] * b[0][col] + a[row][1] * b[1][col];
    }
    out
}

fn matrix_h() -> Mat2 {
    let f = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
    [[f, f], [f, -f]]
}

fn matrix_s() -> Mat2 {
    [
        [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
        [Complex64::new(0.0, 0.0), Complex64::new(0.0, 1.0)],
    ]
}

/// The four Pauli matrices in index order `I = 0, Z = 1, X = 2, Y = 3`.
pub fn pauli_matrix(pauli: u8) -> Mat2 {
    let zero = Complex64::zero();
    let one = Complex64::one();
    let i = Complex64::new(0.0, 1.0);
    match pauli {
        0 => [[one, zero], [zero, one]],
        1 => [[one, zero], [zero, -one]],
        2 => [[zero, one], [one, zero]],
        3 => [[zero, -i], [i, zero]],
        _ => panic!("invalid Pauli index {pauli}"),
    }
}

/// The canonical C1 catalog with its group tables.
pub struct C1Catalog {
    tableaus: Vec<Tableau>,
    matrices: Vec<Mat2>,
    key_to_index: HashMap<Vec<u8>, u8>,
    mul: [[u8; NUM_C1]; NUM_C1],
    inv: [u8; NUM_C1],
}

impl C1Catalog {
    fn build() -> Self {
        let mut tableaus: Vec<Tableau> = Vec::with_capacity(NUM_C1);
        let mut matrices: Vec<Mat2> = Vec::with_capacity(NUM_C1);
        let mut key_to_index: HashMap<Vec<u8>, u8> = HashMap::new();

        let generators = [
            (one_qubit_gate("h").unwrap(), matrix_h()),
            (one_qubit_gate("s").unwrap(), matrix_s()),
        ];

        let identity = Tableau::identity(1);
        key_to_index.insert(identity.key(), 0);
        tableaus.push(identity);
        matrices.push(pauli_matrix(0));

        let mut frontier = 0;
        while frontier < tableaus.len() {
            let current = tableaus[frontier].clone();
            let current_matrix = matrices[frontier];
            for (gen_tableau, gen_matrix) in &generators {
                let next = gen_tableau.compose(&current);
                let key = next.key();
                if !key_to_index.contains_key(&key) {
                    key_to_index.insert(key, tableaus.len() as u8);
                    tableaus.push(next);
                    matrices.push(mat_mul(gen_matrix, &current_matrix));
                }
            }
            frontier += 1;
        }
        assert_eq!(tableaus.len(), NUM_C1);

        let mut mul = [[0u8; NUM_C1]; NUM_C1];
        for lhs in 0..NUM_C1 {
            for rhs in 0..NUM_C1 {
                let product = tableaus[lhs].compose(&tableaus[rhs]);
                mul[lhs][rhs] = key_to_index[&product.key()];
            }
        }

        let mut inv = [0u8; NUM_C1];
        for idx in 0..NUM_C1 {
            inv[idx] = key_to_index[&tableaus[idx].adjoint().key()];
        }

        Self {
            tableaus,
            matrices,
            key_to_index,
            mul,
            inv,
        }
    }

    /// The tableau of element `idx`.
    pub fn tableau(&self, idx: u8) -> &Tableau {
        &self.tableaus[idx as usize]
    }

    /// The unitary matrix of element `idx`, up to global phase.
    pub fn matrix(&self, idx: u8) -> &Mat2 {
        &self.matrices[idx as usize]
    }

    /// The index of a one-qubit tableau, if it is in the catalog.
    pub fn index_of(&self, tableau: &Tableau) -> Option<u8> {
        self.key_to_index.get(&tableau.key()).copied()
    }

    /// Index of the product `lhs * rhs` (with `rhs` applied first).
    pub fn multiply(&self, lhs: u8, rhs: u8) -> u8 {
        self.mul[lhs as usize][rhs as usize]
    }

    /// Index of the group inverse.
    pub fn invert(&self, idx: u8) -> u8 {
        self.inv[idx as usize]
    }
}

/// Pushes a projective Pauli (one index per qubit) through the Clifford with
/// the given tableau, dropping the sign.
pub fn conjugate_paulis(tableau: &Tableau, paulis: &[u8]) -> Vec<u8> {
    let n = tableau.num_qubits();
    assert_eq!(paulis.len(), n);
    let data = tableau.as_array();

    let mut accum = vec![false; 2 * n];
    for (qubit, &pauli) in paulis.iter().enumerate() {
        let x = pauli & 2 != 0;
        let z = pauli & 1 != 0;
        for (bit, row) in [(x, qubit), (z, n + qubit)] {
            if bit {
                for col in 0..2 * n {
                    accum[col] ^= data[(row, col)];
                }
            }
        }
    }

    (0..n)
        .map(|qubit| ((accum[qubit] as u8) << 1) | accum[n + qubit] as u8)
        .collect()
}

type PauliPairTable = [[(u8, u8); 4]; 4];
type C1PairTable = Vec<Option<(u8, u8)>>; // NUM_C1 * NUM_C1, row-major in (c0, c1)

/// Conjugation tables for one named two-qubit entangler.
pub struct TwoQubitTables {
    pauli: [PauliPairTable; 2],
    c1: [C1PairTable; 2],
}

impl TwoQubitTables {
    fn build(gate: &Tableau) -> Self {
        let adjoint = gate.adjoint();
        let pauli = [
            Self::build_pauli(gate),
            Self::build_pauli(&adjoint),
        ];
        let c1 = [Self::build_c1(gate), Self::build_c1(&adjoint)];
        Self { pauli, c1 }
    }

    fn build_pauli(conjugator: &Tableau) -> PauliPairTable {
        let mut table = [[(0u8, 0u8); 4]; 4];
        for p0 in 0..4u8 {
            for p1 in 0..4u8 {
                let image = conjugate_paulis(conjugator, &[p0, p1]);
                table[p0 as usize][p1 as usize] = (image[0], image[1]);
            }
        }
        table
    }

    fn build_c1(conjugator: &Tableau) -> C1PairTable {
        let adjoint = conjugator.adjoint();
        let mut table = vec![None; NUM_C1 * NUM_C1];
        for c0 in 0..NUM_C1 {
            for c1 in 0..NUM_C1 {
                let pair = Tableau::tensor(C1_CATALOG.tableau(c0 as u8), C1_CATALOG.tableau(c1 as u8));
                let conjugated = conjugator.compose(&pair).compose(&adjoint);
                table[c0 * NUM_C1 + c1] = conjugated.factorize_two_qubit().map(|(low, high)| {
                    (
                        C1_CATALOG.index_of(&low).expect("low factor is a C1 element"),
                        C1_CATALOG.index_of(&high).expect("high factor is a C1 element"),
                    )
                });
            }
        }
        table
    }
}

/// Conjugation tables for one named one-qubit gate.
pub struct OneQubitTables {
    pauli: [[u8; 4]; 2],
    c1: [[u8; NUM_C1]; 2],
}

impl OneQubitTables {
    fn build(gate: &Tableau) -> Self {
        let adjoint = gate.adjoint();
        let pauli = [Self::build_pauli(gate), Self::build_pauli(&adjoint)];
        let c1 = [Self::build_c1(gate), Self::build_c1(&adjoint)];
        Self { pauli, c1 }
    }

    fn build_pauli(conjugator: &Tableau) -> [u8; 4] {
        let mut table = [0u8; 4];
        for (pauli, entry) in table.iter_mut().enumerate() {
            *entry = conjugate_paulis(conjugator, &[pauli as u8])[0];
        }
        table
    }

    fn build_c1(conjugator: &Tableau) -> [u8; NUM_C1] {
        let adjoint = conjugator.adjoint();
        let mut table = [0u8; NUM_C1];
        for (idx, entry) in table.iter_mut().enumerate() {
            let conjugated = conjugator
                .compose(C1_CATALOG.tableau(idx as u8))
                .compose(&adjoint);
            *entry = C1_CATALOG
                .index_of(&conjugated)
                .expect("conjugation stays in C1");
        }
        table
    }
}

fn direction_index(conjugation: Conjugation) -> usize {
    match conjugation {
        Conjugation::ByGate => 0,
        Conjugation::ByAdjoint => 1,
    }
}

/// Names of the supported two-qubit entanglers.
pub const TWO_QUBIT_GATES: [&str; 4] = ["cx", "cz", "ecr", "swap"];

/// Names of the supported one-qubit fixed gates.
pub const ONE_QUBIT_GATES: [&str; 8] = ["id", "h", "s", "sdg", "sx", "x", "y", "z"];

lazy_static! {
    /// The canonical single-qubit Clifford catalog.
    pub static ref C1_CATALOG: C1Catalog = C1Catalog::build();

    static ref TWO_QUBIT_TABLES: HashMap<&'static str, TwoQubitTables> = TWO_QUBIT_GATES
        .iter()
        .map(|&name| (name, TwoQubitTables::build(&two_qubit_gate(name).unwrap())))
        .collect();

    static ref ONE_QUBIT_TABLES: HashMap<&'static str, OneQubitTables> = ONE_QUBIT_GATES
        .iter()
        .map(|&name| (name, OneQubitTables::build(&one_qubit_gate(name).unwrap())))
        .collect();
}

/// Whether `gate` has a two-qubit conjugation table.
pub fn is_two_qubit_gate(gate: &str) -> bool {
    TWO_QUBIT_TABLES.contains_key(gate)
}

/// Whether `gate` has a one-qubit conjugation table.
pub fn is_one_qubit_gate(gate: &str) -> bool {
    ONE_QUBIT_TABLES.contains_key(gate)
}

/// The Pauli-pair image table of a two-qubit entangler.
pub fn pauli_past_two_qubit(gate: &str, conjugation: Conjugation) -> Result<&'static PauliPairTable> {
    let tables = TWO_QUBIT_TABLES
        .get(gate)
        .ok_or_else(|| Error::UnknownGate(gate.to_string()))?;
    Ok(&tables.pauli[direction_index(conjugation)])
}

/// The Pauli image table of a one-qubit gate.
pub fn pauli_past_one_qubit(gate: &str, conjugation: Conjugation) -> Result<&'static [u8; 4]> {
    let tables = ONE_QUBIT_TABLES
        .get(gate)
        .ok_or_else(|| Error::UnknownGate(gate.to_string()))?;
    Ok(&tables.pauli[direction_index(conjugation)])
}

/// The C1-pair image table of a two-qubit entangler. Entries are `None` when
/// the conjugated pair does not factorize into C1 (x) C1.
pub fn c1_past_two_qubit(gate: &str, conjugation: Conjugation) -> Result<&'static C1PairTable> {
    let tables = TWO_QUBIT_TABLES
        .get(gate)
        .ok_or_else(|| Error::UnknownGate(gate.to_string()))?;
    Ok(&tables.c1[direction_index(conjugation)])
}

/// The C1 image table of a one-qubit gate.
pub fn c1_past_one_qubit(gate: &str, conjugation: Conjugation) -> Result<&'static [u8; NUM_C1]> {
    let tables = ONE_QUBIT_TABLES
        .get(gate)
        .ok_or_else(|| Error::UnknownGate(gate.to_string()))?;
    Ok(&tables.c1[direction_index(conjugation)])
}

/// Looks up one C1-pair entry, `(c0, c1)` ordered with `c0` on the lower
/// qubit of the pair.
pub fn c1_pair_entry(table: &C1PairTable, c0: u8, c1: u8) -> Option<(u8, u8)> {
    table[c0 as usize * NUM_C1 + c1 as usize]
}

/// All `(c0, c1)` pairs that stay local under adjoint-conjugation by `gate`,
/// in lexicographic order. This is the support of `UniformLocalC1`.
pub fn local_c1_pairs(gate: &str) -> Result<Vec<(u8, u8)>> {
    if is_one_qubit_gate(gate) {
        return Err(Error::NotATwoQubitGate(gate.to_string()));
    }
    let table = c1_past_two_qubit(gate, Conjugation::ByAdjoint)?;
    Ok(iproduct!(0..NUM_C1 as u8, 0..NUM_C1 as u8)
        .filter(|&(c0, c1)| c1_pair_entry(table, c0, c1).is_some())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_mat_eq_up_to_phase(lhs: &Mat2, rhs: &Mat2) {
        // find the first entry of rhs with non-negligible magnitude
        let mut phase = None;
        for row in 0..2 {
            for col in 0..2 {
                if rhs[row][col].norm() > 1e-9 {
                    phase.get_or_insert(lhs[row][col] / rhs[row][col]);
                }
            }
        }
        let phase = phase.expect("matrix is non-zero");
        assert_abs_diff_eq!(phase.norm(), 1.0, epsilon = 1e-9);
        for row in 0..2 {
            for col in 0..2 {
                let expected = rhs[row][col] * phase;
                assert_abs_diff_eq!(lhs[row][col].re, expected.re, epsilon = 1e-9);
                assert_abs_diff_eq!(lhs[row][col].im, expected.im, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn catalog_has_24_elements_with_identity_first() {
        assert_eq!(C1_CATALOG.tableau(0), &Tableau::identity(1));
        assert_eq!(C1_CATALOG.multiply(0, 7), 7);
        assert_eq!(C1_CATALOG.multiply(7, 0), 7);
    }

    #[test]
    fn multiplication_table_matches_matrices() {
        for lhs in 0..NUM_C1 as u8 {
            for rhs in 0..NUM_C1 as u8 {
                let product_idx = C1_CATALOG.multiply(lhs, rhs);
                let expected = mat_mul(C1_CATALOG.matrix(lhs), C1_CATALOG.matrix(rhs));
                assert_mat_eq_up_to_phase(C1_CATALOG.matrix(product_idx), &expected);
            }
        }
    }

    #[test]
    fn inverse_table_is_involutive_on_products() {
        for idx in 0..NUM_C1 as u8 {
            assert_eq!(C1_CATALOG.multiply(idx, C1_CATALOG.invert(idx)), 0);
            assert_eq!(C1_CATALOG.multiply(C1_CATALOG.invert(idx), idx), 0);
        }
    }

    #[test]
    fn cx_pauli_table_matches_known_relations() {
        let table = pauli_past_two_qubit("cx", Conjugation::ByGate).unwrap();
        // X(x)I -> X(x)X, I(x)Z -> Z(x)Z, Z(x)I -> Z(x)I, I(x)X -> I(x)X
        assert_eq!(table[2][0], (2, 2));
        assert_eq!(table[0][1], (1, 1));
        assert_eq!(table[1][0], (1, 0));
        assert_eq!(table[0][2], (0, 2));
    }

    #[test]
    fn pauli_pairs_are_always_local_in_c1_tables() {
        // The sixteen Pauli pairs conjugate to Pauli pairs, so they must all
        // have non-sentinel entries for every gate.
        for gate in TWO_QUBIT_GATES {
            let c1_table = c1_past_two_qubit(gate, Conjugation::ByAdjoint).unwrap();
            let pauli_elements: Vec<u8> = (0..NUM_C1 as u8)
                .filter(|&idx| {
                    let tab = C1_CATALOG.tableau(idx).as_array();
                    // Pauli tableaus have the identity symplectic block.
                    tab[(0, 0)] && !tab[(0, 1)] && !tab[(1, 0)] && tab[(1, 1)]
                })
                .collect();
            assert_eq!(pauli_elements.len(), 4);
            for &c0 in &pauli_elements {
                for &c1 in &pauli_elements {
                    assert!(c1_pair_entry(c1_table, c0, c1).is_some());
                }
            }
        }
    }

    #[test]
    fn c1_table_entries_verify_against_tableau_composition() {
        for gate in ["cx", "cz", "ecr"] {
            let gate_tableau = two_qubit_gate(gate).unwrap();
            let gate_adjoint = gate_tableau.adjoint();
            let table = c1_past_two_qubit(gate, Conjugation::ByAdjoint).unwrap();
            for c0 in 0..NUM_C1 as u8 {
                for c1 in 0..NUM_C1 as u8 {
                    let pair =
                        Tableau::tensor(C1_CATALOG.tableau(c0), C1_CATALOG.tableau(c1));
                    let conjugated = gate_adjoint.compose(&pair).compose(&gate_tableau);
                    match c1_pair_entry(table, c0, c1) {
                        Some((low, high)) => {
                            let expected = Tableau::tensor(
                                C1_CATALOG.tableau(low),
                                C1_CATALOG.tableau(high),
                            );
                            assert_eq!(conjugated, expected, "({c0}, {c1}) through {gate}");
                        }
                        None => {
                            assert!(
                                conjugated.factorize_two_qubit().is_none(),
                                "({c0}, {c1}) through {gate} should be non-local"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn local_pairs_rejects_one_qubit_gates() {
        assert!(matches!(
            local_c1_pairs("h"),
            Err(Error::NotATwoQubitGate(_))
        ));
        assert!(matches!(local_c1_pairs("bogus"), Err(Error::UnknownGate(_))));
    }
}
