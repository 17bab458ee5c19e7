//! Sparse Pauli-Lindblad noise models and their signed sampler.

use std::collections::BTreeSet;

use ndarray::Array2;
use rand::Rng;
use rand::rngs::StdRng;

use crate::error::{Result, SamplexConstructionError};
use virtual_registers::registers::{PauliRegister, Z2Register};

/// One generator of a Pauli-Lindblad map: a sparse Pauli over the qubits it
/// touches. Pauli values use the register convention `I = 0, Z = 1, X = 2,
/// Y = 3`; identity entries are allowed but pointless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsePauliTerm {
    pub paulis: Vec<u8>,
    pub qubits: Vec<usize>,
}

impl SparsePauliTerm {
    pub fn new(paulis: Vec<u8>, qubits: Vec<usize>) -> Self {
        debug_assert_eq!(paulis.len(), qubits.len());
        Self { paulis, qubits }
    }

    /// Parses a little-endian dense label like `"XX"` over qubits `0..n`.
    pub fn from_label(label: &str) -> Result<Self> {
        let paulis: Vec<u8> = label
            .chars()
            .map(|ch| match ch {
                'I' => Ok(0),
                'Z' => Ok(1),
                'X' => Ok(2),
                'Y' => Ok(3),
                _ => Err(SamplexConstructionError::InvalidPauliLabel(ch)),
            })
            .collect::<std::result::Result<_, _>>()?;
        let qubits = (0..paulis.len()).collect();
        Ok(Self { paulis, qubits })
    }
}

/// The generator structure of a Pauli-Lindblad noise map. Rates are not part
/// of the model; they are bound at sampling time under `noise_maps.<ref>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseModel {
    num_qubits: usize,
    terms: Vec<SparsePauliTerm>,
}

impl NoiseModel {
    pub fn new(num_qubits: usize, terms: Vec<SparsePauliTerm>) -> Self {
        debug_assert!(
            terms
                .iter()
                .all(|term| term.qubits.iter().all(|&q| q < num_qubits))
        );
        Self { num_qubits, terms }
    }

    /// A model over dense little-endian labels acting on `label.len()`
    /// qubits each.
    pub fn from_labels(num_qubits: usize, labels: &[&str]) -> Result<Self> {
        let terms = labels
            .iter()
            .map(|label| SparsePauliTerm::from_label(label))
            .collect::<Result<_>>()?;
        Ok(Self::new(num_qubits, terms))
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> &[SparsePauliTerm] {
        &self.terms
    }

    /// The probability that a generator with rate `rate` fires in one
    /// application of the map.
    pub fn fire_probability(rate: f64) -> f64 {
        0.5 * (1.0 - (-2.0 * rate.abs()).exp())
    }

    /// Draws `num_randomizations` signed samples of the map with the given
    /// per-term rates.
    ///
    /// Each generator fires independently with probability
    /// `(1 - exp(-2 |rate|)) / 2`; fired generators compose into the Pauli
    /// column, and a firing generator with a negative rate flips the sign
    /// bit of that randomization.
    pub fn signed_sample(
        &self,
        rates: &[f64],
        num_randomizations: usize,
        rng: &mut StdRng,
    ) -> (PauliRegister, Z2Register) {
        debug_assert_eq!(rates.len(), self.terms.len());
        let mut paulis = Array2::<u8>::zeros((self.num_qubits, num_randomizations));
        let mut signs = Array2::from_elem((1, num_randomizations), false);

        for randomization in 0..num_randomizations {
            for (term, &rate) in self.terms.iter().zip(rates) {
                if rng.gen_bool(Self::fire_probability(rate)) {
                    for (&pauli, &qubit) in term.paulis.iter().zip(&term.qubits) {
                        paulis[(qubit, randomization)] ^= pauli;
                    }
                    if rate < 0.0 {
                        signs[(0, randomization)] ^= true;
                    }
                }
            }
        }

        (PauliRegister::new(paulis), Z2Register::new(signs))
    }
}

/// A noise map the samplex requires the input bundle to provide rates for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseRequirement {
    /// The unique reference of the noise map.
    pub noise_ref: String,
    /// The number of qubits the map acts on.
    pub num_qubits: usize,
    /// The number of generators, fixing the length of the rates array.
    pub num_terms: usize,
    /// Modifier references whose scale inputs apply to this map.
    pub noise_modifiers: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn invalid_label_characters_are_rejected() {
        assert!(matches!(
            NoiseModel::from_labels(2, &["XQ"]),
            Err(crate::error::Error::Construction(
                SamplexConstructionError::InvalidPauliLabel('Q')
            ))
        ));
        assert!(SparsePauliTerm::from_label("x").is_err());
    }

    #[test]
    fn zero_rates_never_fire() {
        let model = NoiseModel::from_labels(2, &["XX"]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let (paulis, signs) = model.signed_sample(&[0.0], 100, &mut rng);
        assert!(paulis.gates().iter().all(|&value| value == 0));
        assert!(signs.bits().iter().all(|&bit| !bit));
    }

    #[test]
    fn fire_probability_saturates_at_one_half() {
        assert_eq!(NoiseModel::fire_probability(0.0), 0.0);
        assert!((NoiseModel::fire_probability(100.0) - 0.5).abs() < 1e-12);
        assert!(NoiseModel::fire_probability(0.05) < 0.5);
    }

    #[test]
    fn large_rates_fire_about_half_the_time() {
        let model = NoiseModel::from_labels(2, &["XX"]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let (paulis, _) = model.signed_sample(&[100.0], 10_000, &mut rng);
        let fired = (0..10_000)
            .filter(|&column| paulis.gates()[(0, column)] == 2)
            .count();
        assert!((4_500..5_500).contains(&fired), "fired {fired} times");
    }

    #[test]
    fn negative_rates_flip_signs_when_firing() {
        let model = NoiseModel::from_labels(1, &["X"]).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let (paulis, signs) = model.signed_sample(&[-100.0], 1000, &mut rng);
        for column in 0..1000 {
            let fired = paulis.gates()[(0, column)] == 2;
            assert_eq!(signs.bits()[(0, column)], fired);
        }
    }
}
