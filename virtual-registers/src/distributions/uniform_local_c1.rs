use ndarray::Array2;
use rand::Rng;
use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::registers::C1Register;
use crate::tables::local_c1_pairs;

/// The uniform distribution over C1 (x) C1 elements that stay local under
/// conjugation by a named two-qubit gate.
///
/// For each pair of consecutive subsystems, independently draws a pair
/// `(c0, c1)` uniformly from the set of pairs whose conjugation table entry
/// is non-sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLocalC1 {
    num_subsystems: usize,
    gate: String,
    valid_pairs: Vec<(u8, u8)>,
}

impl UniformLocalC1 {
    /// Constructs the distribution.
    ///
    /// Fails when `num_subsystems` is odd or `gate` has no two-qubit
    /// conjugation table.
    pub fn new(num_subsystems: usize, gate: &str) -> Result<Self> {
        if num_subsystems % 2 != 0 {
            return Err(Error::OddSubsystemCount(num_subsystems));
        }
        let valid_pairs = local_c1_pairs(gate)?;
        Ok(Self {
            num_subsystems,
            gate: gate.to_string(),
            valid_pairs,
        })
    }

    pub fn num_subsystems(&self) -> usize {
        self.num_subsystems
    }

    pub fn gate(&self) -> &str {
        &self.gate
    }

    pub fn sample(&self, size: usize, rng: &mut StdRng) -> C1Register {
        let mut gates = Array2::zeros((self.num_subsystems, size));
        for pair_idx in 0..self.num_subsystems / 2 {
            for column in 0..size {
                let (c0, c1) = self.valid_pairs[rng.gen_range(0..self.valid_pairs.len())];
                gates[(2 * pair_idx, column)] = c0;
                gates[(2 * pair_idx + 1, column)] = c1;
            }
        }
        C1Register::new(gates).expect("sampled indices are in range")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{Conjugation, c1_pair_entry, c1_past_two_qubit};
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn rejects_odd_subsystem_counts() {
        assert!(matches!(
            UniformLocalC1::new(3, "cx"),
            Err(Error::OddSubsystemCount(3))
        ));
    }

    #[test]
    fn rejects_unknown_and_one_qubit_gates() {
        assert!(matches!(
            UniformLocalC1::new(2, "not_a_gate"),
            Err(Error::UnknownGate(_))
        ));
        assert!(matches!(
            UniformLocalC1::new(2, "h"),
            Err(Error::NotATwoQubitGate(_))
        ));
    }

    #[test]
    fn sample_has_requested_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let dist = UniformLocalC1::new(4, "cz").unwrap();
        let reg = dist.sample(50, &mut rng);
        assert_eq!(reg.num_subsystems(), 4);
        assert_eq!(reg.num_randomizations(), 50);
    }

    #[test]
    fn samples_stay_local_for_every_gate() {
        for gate in ["cx", "cz", "ecr"] {
            let table = c1_past_two_qubit(gate, Conjugation::ByAdjoint).unwrap();
            let mut rng = StdRng::seed_from_u64(8);
            let reg = UniformLocalC1::new(6, gate).unwrap().sample(200, &mut rng);
            for pair_idx in 0..3 {
                for column in 0..200 {
                    let c0 = reg.gates()[(2 * pair_idx, column)];
                    let c1 = reg.gates()[(2 * pair_idx + 1, column)];
                    assert!(
                        c1_pair_entry(table, c0, c1).is_some(),
                        "pair ({c0}, {c1}) is not local for {gate}"
                    );
                }
            }
        }
    }

    #[test]
    fn samples_cover_the_full_support() {
        let dist = UniformLocalC1::new(2, "cx").unwrap();
        let expected: HashSet<(u8, u8)> = dist.valid_pairs.iter().copied().collect();

        let mut rng = StdRng::seed_from_u64(77);
        let reg = dist.sample(100_000, &mut rng);
        let observed: HashSet<(u8, u8)> = (0..reg.num_randomizations())
            .map(|column| (reg.gates()[(0, column)], reg.gates()[(1, column)]))
            .collect();
        assert_eq!(observed, expected);
    }
}
