use ndarray::Array2;
use rand::Rng;
use rand::rngs::StdRng;

use crate::registers::PauliRegister;

/// Multipliers for the four replications, in the fixed order I, X, Z, Y.
/// This particular ordering guarantees that for each qubit, X or Y is drawn
/// as often as I or Z even when the sample count is even but not a multiple
/// of four.
const MULTIPLIERS: [u8; 4] = [0, 2, 1, 3];

/// The balanced uniform distribution over virtual Pauli gates.
///
/// *Balanced* means that on every qubit, each of the four Paulis appears the
/// same number of times, provided the requested number of samples is a
/// multiple of four. The algorithm draws four times fewer Paulis uniformly
/// and i.i.d. than requested, then replicates each draw four times with
/// multiplications by I, X, Z, and Y, truncating when the requested count is
/// not a multiple of four. The four replications of a draw are consecutive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancedUniformPauli {
    pub num_subsystems: usize,
}

impl BalancedUniformPauli {
    pub fn new(num_subsystems: usize) -> Self {
        Self { num_subsystems }
    }

    pub fn sample(&self, size: usize, rng: &mut StdRng) -> PauliRegister {
        let num_base = size / 4 + usize::from(size % 4 != 0);
        let base =
            Array2::from_shape_fn((self.num_subsystems, num_base), |_| rng.gen_range(0..4u8));

        let mut gates = Array2::zeros((self.num_subsystems, size));
        for subsystem in 0..self.num_subsystems {
            for column in 0..size {
                gates[(subsystem, column)] =
                    base[(subsystem, column / 4)] ^ MULTIPLIERS[column % 4];
            }
        }
        PauliRegister::new(gates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sample_has_requested_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(BalancedUniformPauli::new(1).sample(1, &mut rng).num_randomizations(), 1);
        let reg = BalancedUniformPauli::new(8).sample(100, &mut rng);
        assert_eq!(reg.num_subsystems(), 8);
        assert_eq!(reg.num_randomizations(), 100);
    }

    #[test]
    fn counts_are_balanced_for_every_truncation() {
        for num_samples in [0usize, 3, 4, 7, 11, 16] {
            let mut rng = StdRng::seed_from_u64(42);
            let reg = BalancedUniformPauli::new(5).sample(num_samples, &mut rng);
            let min_expected = num_samples / 4;
            let max_expected = min_expected + usize::from(num_samples % 4 != 0);
            for pauli in 0..4u8 {
                for subsystem in 0..5 {
                    let count = (0..num_samples)
                        .filter(|&column| reg.gates()[(subsystem, column)] == pauli)
                        .count();
                    assert!(
                        count == min_expected || count == max_expected,
                        "pauli {pauli} appeared {count} times in {num_samples} samples"
                    );
                }
            }
        }
    }

    #[test]
    fn x_or_y_balances_i_or_z_for_even_sizes() {
        let mut rng = StdRng::seed_from_u64(7);
        let reg = BalancedUniformPauli::new(3).sample(10, &mut rng);
        for subsystem in 0..3 {
            let x_like = (0..10)
                .filter(|&column| reg.gates()[(subsystem, column)] & 2 != 0)
                .count();
            assert_eq!(x_like, 5);
        }
    }

    #[test]
    fn replications_are_consecutive() {
        let mut rng = StdRng::seed_from_u64(13);
        let reg = BalancedUniformPauli::new(3).sample(20, &mut rng);
        for subsystem in 0..3 {
            for block in (0..20).step_by(4) {
                let mut values: Vec<u8> = (block..block + 4)
                    .map(|column| reg.gates()[(subsystem, column)])
                    .collect();
                values.sort_unstable();
                assert_eq!(values, vec![0, 1, 2, 3]);
            }
        }
    }
}
