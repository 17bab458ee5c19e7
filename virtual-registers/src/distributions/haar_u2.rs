use num_complex::Complex64;
use rand::rngs::StdRng;
use rand_distr::{Distribution as RandDistribution, StandardNormal};

use crate::registers::U2Register;

/// The Haar measure over single-qubit unitaries.
///
/// Uses the standard construction: draw a 2 x 2 complex Gaussian matrix,
/// orthonormalize its columns, and fix the phases so the result is Haar
/// distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaarU2 {
    pub num_subsystems: usize,
}

impl HaarU2 {
    pub fn new(num_subsystems: usize) -> Self {
        Self { num_subsystems }
    }

    pub fn sample(&self, size: usize, rng: &mut StdRng) -> U2Register {
        U2Register::from_matrix_fn(self.num_subsystems, size, |_, _| haar_matrix(rng))
    }
}

fn complex_gaussian(rng: &mut StdRng) -> Complex64 {
    let re: f64 = StandardNormal.sample(rng);
    let im: f64 = StandardNormal.sample(rng);
    Complex64::new(re, im)
}

fn haar_matrix(rng: &mut StdRng) -> [[Complex64; 2]; 2] {
    // QR decomposition of a Ginibre matrix via Gram-Schmidt on the columns,
    // with the R diagonal phases divided out.
    let ginibre = [
        [complex_gaussian(rng), complex_gaussian(rng)],
        [complex_gaussian(rng), complex_gaussian(rng)],
    ];

    let col0 = [ginibre[0][0], ginibre[1][0]];
    let r00 = (col0[0].norm_sqr() + col0[1].norm_sqr()).sqrt();
    let q0 = [col0[0] / r00, col0[1] / r00];

    let col1 = [ginibre[0][1], ginibre[1][1]];
    let overlap = q0[0].conj() * col1[0] + q0[1].conj() * col1[1];
    let mut q1 = [col1[0] - overlap * q0[0], col1[1] - overlap * q0[1]];
    let r11 = (q1[0].norm_sqr() + q1[1].norm_sqr()).sqrt();
    q1 = [q1[0] / r11, q1[1] / r11];

    // The Gram-Schmidt R diagonal is already real and positive here except
    // for the phase convention of the first column, which is fixed by the
    // sign of r00; nothing further to divide out.
    [[q0[0], q1[0]], [q0[1], q1[1]]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    #[test]
    fn samples_are_unitary() {
        let mut rng = StdRng::seed_from_u64(5);
        let reg = HaarU2::new(3).sample(50, &mut rng);
        let identity = reg.multiply(&reg.invert(), None).unwrap();
        let expected = U2Register::identity(3, 50);
        for (lhs, rhs) in identity.gates().iter().zip(expected.gates().iter()) {
            assert_abs_diff_eq!(lhs.re, rhs.re, epsilon = 1e-10);
            assert_abs_diff_eq!(lhs.im, rhs.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn first_moment_vanishes() {
        // The Haar average of a single matrix entry is zero.
        let mut rng = StdRng::seed_from_u64(23);
        let reg = HaarU2::new(1).sample(20_000, &mut rng);
        let mut mean = Complex64::new(0.0, 0.0);
        for j in 0..reg.num_randomizations() {
            mean += reg.matrix(0, j)[0][0];
        }
        mean /= reg.num_randomizations() as f64;
        assert!(mean.norm() < 0.02, "Haar first moment too large: {mean}");
    }
}
