use ndarray::Array2;
use rand::Rng;
use rand::rngs::StdRng;

use crate::registers::PauliRegister;

/// The uniform distribution over virtual Pauli gates, i.i.d. per qubit and
/// randomization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformPauli {
    pub num_subsystems: usize,
}

impl UniformPauli {
    pub fn new(num_subsystems: usize) -> Self {
        Self { num_subsystems }
    }

    pub fn sample(&self, size: usize, rng: &mut StdRng) -> PauliRegister {
        let gates = Array2::from_shape_fn((self.num_subsystems, size), |_| rng.gen_range(0..4u8));
        PauliRegister::new(gates)
    }
}
