//! Shared helpers for the integration tests: a small dense-matrix
//! simulator used to check that bound templates realize the expected
//! unitaries.

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;

use samplex::circuit::{Angle, Circuit, Gate, Operation};

pub type CMat = Array2<Complex64>;

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

pub fn identity(num_qubits: usize) -> CMat {
    Array2::eye(1 << num_qubits)
}

fn gate_matrix_1q(gate: &Gate, params: ArrayView1<f64>) -> CMat {
    let f = std::f64::consts::FRAC_1_SQRT_2;
    let angle = |angle: &Angle| match angle {
        Angle::Index(idx) => params[*idx],
        Angle::Expr(expr) => expr.evaluate(&|_| 0.0),
    };
    let entries: Vec<Complex64> = match gate {
        Gate::Id => vec![c(1., 0.), c(0., 0.), c(0., 0.), c(1., 0.)],
        Gate::H => vec![c(f, 0.), c(f, 0.), c(f, 0.), c(-f, 0.)],
        Gate::S => vec![c(1., 0.), c(0., 0.), c(0., 0.), c(0., 1.)],
        Gate::Sdg => vec![c(1., 0.), c(0., 0.), c(0., 0.), c(0., -1.)],
        Gate::Sx => vec![
            c(0.5, 0.5),
            c(0.5, -0.5),
            c(0.5, -0.5),
            c(0.5, 0.5),
        ],
        Gate::X => vec![c(0., 0.), c(1., 0.), c(1., 0.), c(0., 0.)],
        Gate::Y => vec![c(0., 0.), c(0., -1.), c(0., 1.), c(0., 0.)],
        Gate::Z => vec![c(1., 0.), c(0., 0.), c(0., 0.), c(-1., 0.)],
        Gate::Rz(arg) => {
            let half = angle(arg) / 2.0;
            vec![
                Complex64::from_polar(1.0, -half),
                c(0., 0.),
                c(0., 0.),
                Complex64::from_polar(1.0, half),
            ]
        }
        Gate::Rx(arg) => {
            let half = angle(arg) / 2.0;
            vec![
                c(half.cos(), 0.),
                c(0., -half.sin()),
                c(0., -half.sin()),
                c(half.cos(), 0.),
            ]
        }
        other => panic!("{other} is not a one-qubit gate"),
    };
    Array2::from_shape_vec((2, 2), entries).unwrap()
}

fn gate_matrix_2q(gate: &Gate) -> CMat {
    let f = std::f64::consts::FRAC_1_SQRT_2;
    let entries: Vec<Complex64> = match gate {
        Gate::Cx => vec![
            c(1., 0.), c(0., 0.), c(0., 0.), c(0., 0.),
            c(0., 0.), c(0., 0.), c(0., 0.), c(1., 0.),
            c(0., 0.), c(0., 0.), c(1., 0.), c(0., 0.),
            c(0., 0.), c(1., 0.), c(0., 0.), c(0., 0.),
        ],
        Gate::Cz => vec![
            c(1., 0.), c(0., 0.), c(0., 0.), c(0., 0.),
            c(0., 0.), c(1., 0.), c(0., 0.), c(0., 0.),
            c(0., 0.), c(0., 0.), c(1., 0.), c(0., 0.),
            c(0., 0.), c(0., 0.), c(0., 0.), c(-1., 0.),
        ],
        Gate::Swap => vec![
            c(1., 0.), c(0., 0.), c(0., 0.), c(0., 0.),
            c(0., 0.), c(0., 0.), c(1., 0.), c(0., 0.),
            c(0., 0.), c(1., 0.), c(0., 0.), c(0., 0.),
            c(0., 0.), c(0., 0.), c(0., 0.), c(1., 0.),
        ],
        Gate::Ecr => vec![
            c(0., 0.), c(f, 0.), c(0., 0.), c(0., f),
            c(f, 0.), c(0., 0.), c(0., -f), c(0., 0.),
            c(0., 0.), c(0., f), c(0., 0.), c(f, 0.),
            c(0., -f), c(0., 0.), c(f, 0.), c(0., 0.),
        ],
        other => panic!("{other} is not a two-qubit gate"),
    };
    Array2::from_shape_vec((4, 4), entries).unwrap()
}

/// Embeds a small gate matrix acting on the listed qubits (little-endian,
/// `qubits[0]` is the gate's first operand) into the full register space.
pub fn embed(gate: &CMat, qubits: &[usize], num_qubits: usize) -> CMat {
    let dim = 1usize << num_qubits;
    let mut full = Array2::zeros((dim, dim));
    let gate_dim = 1usize << qubits.len();
    for col in 0..dim {
        let gate_in: usize = qubits
            .iter()
            .enumerate()
            .map(|(bit, &qubit)| ((col >> qubit) & 1) << bit)
            .sum();
        for gate_out in 0..gate_dim {
            let mut row = col;
            for (bit, &qubit) in qubits.iter().enumerate() {
                row = (row & !(1 << qubit)) | (((gate_out >> bit) & 1) << qubit);
            }
            full[(row, col)] += gate[(gate_out, gate_in)];
        }
    }
    full
}

/// The unitary of a bound template circuit. Conditionals follow
/// `branch_choice` (true picks the then-branch); measurements and barriers
/// are skipped.
pub fn template_unitary(
    circuit: &Circuit,
    params: ArrayView1<f64>,
    branch_choice: bool,
) -> CMat {
    let mut total = identity(circuit.num_qubits);
    apply_circuit(circuit, params, branch_choice, None, circuit.num_qubits, &mut total);
    total
}

fn apply_circuit(
    circuit: &Circuit,
    params: ArrayView1<f64>,
    branch_choice: bool,
    qubit_map: Option<&[usize]>,
    num_qubits: usize,
    total: &mut CMat,
) {
    for instruction in &circuit.instructions {
        let qubits: Vec<usize> = instruction
            .qubits
            .iter()
            .map(|&qubit| qubit_map.map_or(qubit, |map| map[qubit]))
            .collect();
        match &instruction.operation {
            Operation::Barrier(_) | Operation::Measure => {}
            Operation::Gate(gate) => {
                let small = if gate.num_qubits() == 1 {
                    gate_matrix_1q(gate, params)
                } else {
                    gate_matrix_2q(gate)
                };
                let embedded = embed(&small, &qubits, num_qubits);
                *total = embedded.dot(total);
            }
            Operation::IfElse(if_else) => {
                let body = if branch_choice {
                    Some(&if_else.then_body)
                } else {
                    if_else.else_body.as_ref()
                };
                if let Some(body) = body {
                    apply_circuit(body, params, branch_choice, Some(&qubits), num_qubits, total);
                }
            }
            Operation::Box(box_op) => {
                apply_circuit(
                    &box_op.body,
                    params,
                    branch_choice,
                    Some(&qubits),
                    num_qubits,
                    total,
                );
            }
        }
    }
}

/// Asserts two unitaries are equal up to a global phase.
pub fn assert_unitary_eq(lhs: &CMat, rhs: &CMat, tolerance: f64) {
    let mut phase = None;
    for (a, b) in lhs.iter().zip(rhs.iter()) {
        if b.norm() > 1e-9 {
            phase.get_or_insert(a / b);
        }
    }
    let phase = phase.expect("unitaries are non-zero");
    assert!(
        (phase.norm() - 1.0).abs() < tolerance,
        "phase factor is not unimodular: {phase}"
    );
    for (a, b) in lhs.iter().zip(rhs.iter()) {
        let delta = a - b * phase;
        assert!(
            delta.norm() < tolerance,
            "unitaries differ: {lhs:?} vs {rhs:?}"
        );
    }
}

/// The superoperator `conj(U) (x) U` of a unitary.
pub fn superoperator(unitary: &CMat) -> CMat {
    let dim = unitary.nrows();
    let mut out = Array2::zeros((dim * dim, dim * dim));
    for r1 in 0..dim {
        for c1 in 0..dim {
            for r2 in 0..dim {
                for c2 in 0..dim {
                    out[(r1 * dim + r2, c1 * dim + c2)] =
                        unitary[(r1, c1)].conj() * unitary[(r2, c2)];
                }
            }
        }
    }
    out
}

/// The CX matrix with the control on the gate's first operand.
pub fn cx_matrix() -> CMat {
    let entries: Vec<Complex64> = vec![
        c(1., 0.), c(0., 0.), c(0., 0.), c(0., 0.),
        c(0., 0.), c(0., 0.), c(0., 0.), c(1., 0.),
        c(0., 0.), c(0., 0.), c(1., 0.), c(0., 0.),
        c(0., 0.), c(1., 0.), c(0., 0.), c(0., 0.),
    ];
    Array2::from_shape_vec((4, 4), entries).unwrap()
}

/// One row of a 2-D f64 output tensor.
pub fn output_row(tensor: &samplex::tensor::Tensor, row: usize) -> Array1<f64> {
    let array = tensor.as_f64().expect("f64 output");
    let columns = array.shape()[1];
    Array1::from_iter((0..columns).map(|column| array[[row, column]]))
}
