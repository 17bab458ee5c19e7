//! Synthesizers: fixed single-qubit gate decompositions for dressed layers.
//!
//! A synthesizer owns both sides of the dressing contract: `make_template`
//! emits the parameterized placeholder instructions for one qubit of a
//! dressed layer, and `angles` turns the sampled U2 register into the
//! numeric values of those parameters.

use ndarray::Array3;
use num_complex::Complex64;

use crate::circuit::{Angle, Gate, Instruction, Operation};
use crate::params::ParamIter;
use virtual_registers::registers::U2Register;

/// The supported decompositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Synth {
    /// `U = Rz(phi + pi) . SX . Rz(theta + pi) . SX . Rz(lambda)`
    RzSx,
    /// `U = Rz(phi + pi/2) . Rx(theta) . Rz(lambda - pi/2)`
    RzRx,
    /// The CORPSE composite pulse, with the 2 pi offsets of the first and
    /// second rotation folded into static X gates.
    Corpse,
}

impl Synth {
    pub fn name(self) -> &'static str {
        match self {
            Synth::RzSx => "rzsx",
            Synth::RzRx => "rzrx",
            Synth::Corpse => "corpse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rzsx" => Some(Synth::RzSx),
            "rzrx" => Some(Synth::RzRx),
            "corpse" => Some(Synth::Corpse),
            _ => None,
        }
    }

    /// How many template parameters one qubit of dressing consumes.
    pub fn num_params(self) -> usize {
        match self {
            Synth::RzSx | Synth::RzRx => 3,
            Synth::Corpse => 4,
        }
    }

    /// The placeholder instructions of one dressed qubit, consuming
    /// `num_params` indices from the iterator in application order.
    pub fn make_template(self, qubit: usize, params: &mut ParamIter) -> Vec<Instruction> {
        let gate = |g: Gate| Instruction {
            operation: Operation::Gate(g),
            qubits: vec![qubit],
            clbits: vec![],
        };
        let rz = |idx: usize| gate(Gate::Rz(Angle::Index(idx)));
        let rx = |idx: usize| gate(Gate::Rx(Angle::Index(idx)));

        match self {
            Synth::RzSx => {
                let (p0, p1, p2) = (params.advance(), params.advance(), params.advance());
                vec![rz(p0), gate(Gate::Sx), rz(p1), gate(Gate::Sx), rz(p2)]
            }
            Synth::RzRx => {
                let (p0, p1, p2) = (params.advance(), params.advance(), params.advance());
                vec![rz(p0), rx(p1), rz(p2)]
            }
            Synth::Corpse => {
                let (p0, p1, p2, p3) = (
                    params.advance(),
                    params.advance(),
                    params.advance(),
                    params.advance(),
                );
                vec![
                    rz(p0),
                    rx(p1),
                    gate(Gate::Z),
                    gate(Gate::X),
                    rx(p2),
                    gate(Gate::Z),
                    gate(Gate::X),
                    gate(Gate::X),
                    rx(p1),
                    rz(p3),
                ]
            }
        }
    }

    /// The numeric template values of a dressed layer, shaped
    /// `(num_subsystems, num_randomizations, num_params)`, with every angle
    /// reduced to `(-pi, pi]`.
    pub fn angles(self, register: &U2Register) -> Array3<f64> {
        let shape = (
            register.num_subsystems(),
            register.num_randomizations(),
            self.num_params(),
        );
        let mut values = Array3::zeros(shape);
        for subsystem in 0..shape.0 {
            for randomization in 0..shape.1 {
                let zyz = ZyzAngles::from_matrix(&register.matrix(subsystem, randomization));
                let row = self.angles_from_zyz(&zyz);
                for (idx, value) in row.iter().enumerate() {
                    values[(subsystem, randomization, idx)] = wrap_angle(*value);
                }
            }
        }
        values
    }

    fn angles_from_zyz(self, zyz: &ZyzAngles) -> Vec<f64> {
        use std::f64::consts::{FRAC_PI_2, PI};
        match self {
            Synth::RzSx => vec![zyz.lambda, zyz.theta + PI, zyz.phi + PI],
            Synth::RzRx => vec![zyz.lambda - FRAC_PI_2, zyz.theta, zyz.phi + FRAC_PI_2],
            Synth::Corpse => {
                let half_theta = zyz.theta / 2.0;
                let asin_sin = (half_theta.sin() / 2.0).asin();
                let theta13 = half_theta - asin_sin;
                let theta2 = PI - 2.0 * asin_sin;
                vec![
                    zyz.lambda - FRAC_PI_2,
                    theta13,
                    theta2,
                    zyz.phi + FRAC_PI_2,
                ]
            }
        }
    }
}

/// ZYZ Euler angles of a 2 x 2 unitary: `U = phase . Rz(phi) Ry(theta)
/// Rz(lambda)`.
struct ZyzAngles {
    theta: f64,
    phi: f64,
    lambda: f64,
}

impl ZyzAngles {
    fn from_matrix(matrix: &[[Complex64; 2]; 2]) -> Self {
        let det = matrix[0][0] * matrix[1][1] - matrix[0][1] * matrix[1][0];
        // det^(-1/2) maps the unitary into SU(2), up to an irrelevant sign
        let phase = det.sqrt().inv();

        let theta = 2.0 * matrix[1][0].norm().atan2(matrix[0][0].norm());
        let half_sum = (phase * matrix[1][1]).arg();
        let half_diff = (phase * matrix[1][0]).arg();

        Self {
            theta,
            phi: half_sum + half_diff,
            lambda: half_sum - half_diff,
        }
    }
}

/// Restricts an angle to `(-pi, pi]`.
fn wrap_angle(value: f64) -> f64 {
    use std::f64::consts::PI;
    -(-value + PI).rem_euclid(2.0 * PI) + PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn mat(entries: [[(f64, f64); 2]; 2]) -> [[Complex64; 2]; 2] {
        entries.map(|row| row.map(|(re, im)| Complex64::new(re, im)))
    }

    fn rz(theta: f64) -> [[Complex64; 2]; 2] {
        mat([
            [((theta / 2.0).cos(), -(theta / 2.0).sin()), (0.0, 0.0)],
            [(0.0, 0.0), ((theta / 2.0).cos(), (theta / 2.0).sin())],
        ])
    }

    fn rx(theta: f64) -> [[Complex64; 2]; 2] {
        let c = (theta / 2.0).cos();
        let s = (theta / 2.0).sin();
        mat([[(c, 0.0), (0.0, -s)], [(0.0, -s), (c, 0.0)]])
    }

    fn mat_mul(a: &[[Complex64; 2]; 2], b: &[[Complex64; 2]; 2]) -> [[Complex64; 2]; 2] {
        let mut out = [[Complex64::new(0.0, 0.0); 2]; 2];
        for row in 0..2 {
            for col in 0..2 {
                out[row][col] = a[row][0] * b[0][col] + a[row][1] * b[1][col];
            }
        }
        out
    }

    fn assert_equal_up_to_phase(lhs: &[[Complex64; 2]; 2], rhs: &[[Complex64; 2]; 2]) {
        let mut phase = None;
        for row in 0..2 {
            for col in 0..2 {
                if rhs[row][col].norm() > 1e-9 {
                    phase.get_or_insert(lhs[row][col] / rhs[row][col]);
                }
            }
        }
        let phase = phase.unwrap();
        assert_abs_diff_eq!(phase.norm(), 1.0, epsilon = 1e-9);
        for row in 0..2 {
            for col in 0..2 {
                let delta = lhs[row][col] - rhs[row][col] * phase;
                assert!(delta.norm() < 1e-9, "{lhs:?} != {rhs:?}");
            }
        }
    }

    #[test]
    fn rzrx_reconstructs_random_unitaries() {
        use rand::SeedableRng;
        use rand::rngs::StdRng;
        use virtual_registers::distributions::HaarU2;

        let mut rng = StdRng::seed_from_u64(17);
        let register = HaarU2::new(1).sample(50, &mut rng);
        let values = Synth::RzRx.angles(&register);

        for randomization in 0..50 {
            let target = register.matrix(0, randomization);
            let reconstructed = mat_mul(
                &rz(values[(0, randomization, 2)]),
                &mat_mul(
                    &rx(values[(0, randomization, 1)]),
                    &rz(values[(0, randomization, 0)]),
                ),
            );
            assert_equal_up_to_phase(&reconstructed, &target);
        }
    }

    #[test]
    fn rzsx_reconstructs_random_unitaries() {
        use rand::SeedableRng;
        use rand::rngs::StdRng;
        use virtual_registers::distributions::HaarU2;

        // SX = e^(i pi/4) Rx(pi/2)
        let sx = rx(PI / 2.0);

        let mut rng = StdRng::seed_from_u64(18);
        let register = HaarU2::new(1).sample(50, &mut rng);
        let values = Synth::RzSx.angles(&register);

        for randomization in 0..50 {
            let target = register.matrix(0, randomization);
            let reconstructed = mat_mul(
                &rz(values[(0, randomization, 2)]),
                &mat_mul(
                    &sx,
                    &mat_mul(
                        &rz(values[(0, randomization, 1)]),
                        &mat_mul(&sx, &rz(values[(0, randomization, 0)])),
                    ),
                ),
            );
            assert_equal_up_to_phase(&reconstructed, &target);
        }
    }

    #[test]
    fn identity_has_trivial_rotation_angles() {
        let register = U2Register::identity(1, 1);
        let values = Synth::RzRx.angles(&register);
        assert_abs_diff_eq!(values[(0, 0, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn angles_are_wrapped() {
        assert_abs_diff_eq!(wrap_angle(3.0 * PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(0.25), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn template_lengths_match_parameter_counts() {
        for synth in [Synth::RzSx, Synth::RzRx, Synth::Corpse] {
            let mut params = ParamIter::new();
            let template = synth.make_template(0, &mut params);
            assert_eq!(params.count(), synth.num_params());
            let num_rotations = template
                .iter()
                .filter(|instr| {
                    matches!(
                        &instr.operation,
                        Operation::Gate(gate) if gate.is_parametric()
                    )
                })
                .count();
            assert!(num_rotations >= synth.num_params() - 1);
        }
    }
}
