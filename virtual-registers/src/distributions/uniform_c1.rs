use ndarray::Array2;
use rand::Rng;
use rand::rngs::StdRng;

use crate::registers::C1Register;
use crate::tables::NUM_C1;

/// The uniform distribution over virtual single-qubit Clifford gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformC1 {
    pub num_subsystems: usize,
}

impl UniformC1 {
    pub fn new(num_subsystems: usize) -> Self {
        Self { num_subsystems }
    }

    pub fn sample(&self, size: usize, rng: &mut StdRng) -> C1Register {
        let gates = Array2::from_shape_fn((self.num_subsystems, size), |_| {
            rng.gen_range(0..NUM_C1 as u8)
        });
        C1Register::new(gates).expect("sampled indices are in range")
    }
}
