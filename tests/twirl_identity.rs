//! End-to-end tests: building annotated circuits, sampling, and checking
//! that the bound templates realize the expected unitaries.

mod common;

use common::{
    assert_unitary_eq, cx_matrix, embed, identity, output_row, superoperator, template_unitary,
};
use ndarray::Array2;
use num_complex::Complex64;

use samplex::annotations::{DecompositionMode, DressingMode, GroupMode, Twirl};
use samplex::circuit::{Circuit, IfElseOp, Operation};
use samplex::noise::NoiseModel;
use samplex::prelude::*;
use samplex::samplex::SampleOptions;
use samplex::virtual_registers::registers::VirtualRegister;

fn twirl_sandwich(body: impl FnOnce(&mut Circuit), annotations: Vec<Annotation>) -> Circuit {
    let mut circuit = Circuit::new(2, 0);
    let mut box_body = Circuit::new(2, 0);
    body(&mut box_body);
    circuit.add_box(box_body, annotations, &[0, 1]);
    circuit.add_box(Circuit::new(2, 0), vec![Twirl::right().into()], &[0, 1]);
    circuit
}

fn sample_template(
    circuit: &Circuit,
    num_randomizations: usize,
    seed: u64,
) -> (Circuit, samplex::tensor::SamplexOutput) {
    let (template, mut samplex) = build(circuit).unwrap();
    samplex.finalize().unwrap();
    let inputs = samplex.inputs();
    let options = SampleOptions {
        seed,
        ..SampleOptions::default()
    };
    let output = samplex
        .sample(&inputs, num_randomizations, &options)
        .unwrap();
    (template.template, output)
}

#[test]
fn pauli_twirled_cx_is_exact_per_randomization() {
    let circuit = twirl_sandwich(|body| body.cx(0, 1), vec![Twirl::left().into()]);
    let (template, output) = sample_template(&circuit, 25, 7);

    let expected = embed(&cx_matrix(), &[0, 1], 2);
    let values = output.get("parameter_values").unwrap();
    for randomization in 0..25 {
        let row = output_row(values, randomization);
        let unitary = template_unitary(&template, row.view(), true);
        assert_unitary_eq(&unitary, &expected, 1e-9);
    }
}

#[test]
fn twirled_cz_and_absorbed_single_qubit_gates_are_exact() {
    let circuit = twirl_sandwich(
        |body| {
            body.h(0);
            body.rz(0.7, 1);
            body.cz(0, 1);
        },
        vec![Twirl::left().into()],
    );
    let (template, output) = sample_template(&circuit, 20, 3);

    let mut reference = Circuit::new(2, 0);
    reference.h(0);
    reference.rz(0.7, 1);
    reference.cz(0, 1);
    let expected = template_unitary(&reference, ndarray::Array1::zeros(0).view(), true);

    let values = output.get("parameter_values").unwrap();
    for randomization in 0..20 {
        let row = output_row(values, randomization);
        let unitary = template_unitary(&template, row.view(), true);
        assert_unitary_eq(&unitary, &expected, 1e-9);
    }
}

#[test]
fn balanced_twirl_is_exact_and_balanced() {
    let annotation = Twirl::new(
        GroupMode::BalancedPauli,
        DressingMode::Left,
        DecompositionMode::RzRx,
    );
    let circuit = twirl_sandwich(|body| body.cx(0, 1), vec![annotation.into()]);

    let (template, mut samplex) = build(&circuit).unwrap();
    samplex.finalize().unwrap();
    let inputs = samplex.inputs();
    let options = SampleOptions {
        seed: 11,
        keep_registers: true,
        ..SampleOptions::default()
    };
    let output = samplex.sample(&inputs, 16, &options).unwrap();

    let expected = embed(&cx_matrix(), &[0, 1], 2);
    let values = output.get("parameter_values").unwrap();
    for randomization in 0..16 {
        let row = output_row(values, randomization);
        assert_unitary_eq(
            &template_unitary(&template.template, row.view(), true),
            &expected,
            1e-9,
        );
    }

    // each Pauli appears exactly four times per qubit across 16 draws
    let registers = output.registers.as_ref().unwrap();
    let VirtualRegister::Pauli(lhs) = &registers["twirl0"] else {
        panic!("expected a Pauli twirl register");
    };
    for subsystem in 0..2 {
        for pauli in 0..4u8 {
            let count = (0..16)
                .filter(|&column| lhs.gates()[(subsystem, column)] == pauli)
                .count();
            assert_eq!(count, 4);
        }
    }
}

#[test]
fn local_c1_twirl_of_cx_is_exact() {
    let annotation = Twirl::new(
        GroupMode::LocalC1,
        DressingMode::Left,
        DecompositionMode::RzSx,
    );
    let circuit = twirl_sandwich(|body| body.cx(0, 1), vec![annotation.into()]);
    let (template, output) = sample_template(&circuit, 30, 5);

    let expected = embed(&cx_matrix(), &[0, 1], 2);
    let values = output.get("parameter_values").unwrap();
    for randomization in 0..30 {
        let row = output_row(values, randomization);
        assert_unitary_eq(
            &template_unitary(&template, row.view(), true),
            &expected,
            1e-9,
        );
    }
}

#[test]
fn noise_at_rate_zero_leaves_the_circuit_exact() {
    let model = NoiseModel::from_labels(2, &["XX"]).unwrap();
    let circuit = twirl_sandwich(
        |_| {},
        vec![
            Twirl::left().into(),
            InjectNoise::new("my_noise", model).into(),
        ],
    );
    let (template, mut samplex) = build(&circuit).unwrap();
    samplex.finalize().unwrap();

    let mut inputs = samplex.inputs();
    inputs
        .bind("noise_maps.my_noise", Tensor::from_f64_slice(&[0.0]))
        .unwrap();
    let output = samplex
        .sample(&inputs, 15, &SampleOptions::default())
        .unwrap();

    let expected = identity(2);
    let values = output.get("parameter_values").unwrap();
    for randomization in 0..15 {
        let row = output_row(values, randomization);
        assert_unitary_eq(
            &template_unitary(&template.template, row.view(), true),
            &expected,
            1e-9,
        );
    }
}

#[test]
fn injected_xx_noise_averages_to_the_expected_channel() {
    let model = NoiseModel::from_labels(2, &["XX"]).unwrap();
    let circuit = twirl_sandwich(
        |_| {},
        vec![
            Twirl::left().into(),
            InjectNoise::new("my_noise", model).into(),
        ],
    );
    let (template, mut samplex) = build(&circuit).unwrap();
    samplex.finalize().unwrap();

    let rate = 100.0;
    let mut inputs = samplex.inputs();
    inputs
        .bind("noise_maps.my_noise", Tensor::from_f64_slice(&[rate]))
        .unwrap();
    let num_randomizations = 3000;
    let options = SampleOptions {
        seed: 21,
        ..SampleOptions::default()
    };
    let output = samplex
        .sample(&inputs, num_randomizations, &options)
        .unwrap();

    let values = output.get("parameter_values").unwrap();
    let mut average: Array2<Complex64> = Array2::zeros((16, 16));
    for randomization in 0..num_randomizations {
        let row = output_row(values, randomization);
        let unitary = template_unitary(&template.template, row.view(), true);
        average += &superoperator(&unitary);
    }
    average /= Complex64::new(num_randomizations as f64, 0.0);

    // the XX generator fires with probability (1 - exp(-2 rate)) / 2
    let fire = NoiseModel::fire_probability(rate);
    let xx_superop = {
        let x: Array2<Complex64> = Array2::from_shape_vec(
            (2, 2),
            vec![
                Complex64::new(0., 0.),
                Complex64::new(1., 0.),
                Complex64::new(1., 0.),
                Complex64::new(0., 0.),
            ],
        )
        .unwrap();
        let xx = embed(&x, &[0], 2).dot(&embed(&x, &[1], 2));
        superoperator(&xx)
    };
    let expected = Array2::eye(16).mapv(|value: f64| Complex64::new(value * (1.0 - fire), 0.0))
        + xx_superop.mapv(|value| value * Complex64::new(fire, 0.0));

    for (lhs, rhs) in average.iter().zip(expected.iter()) {
        assert!(
            (lhs - rhs).norm() < 0.06,
            "average channel deviates: {lhs} vs {rhs}"
        );
    }
}

#[test]
fn measurement_flips_follow_the_twirl_x_bits() {
    let mut circuit = Circuit::new(2, 2);
    let mut body = Circuit::new(2, 2);
    body.measure(0, 0);
    body.measure(1, 1);
    circuit.add_box(body, vec![Twirl::left().into()], &[0, 1]);

    let (_, mut samplex) = build(&circuit).unwrap();
    samplex.finalize().unwrap();
    let inputs = samplex.inputs();
    let options = SampleOptions {
        seed: 2,
        keep_registers: true,
        ..SampleOptions::default()
    };
    let output = samplex.sample(&inputs, 50, &options).unwrap();

    let flips = output
        .get("measurement_flips.meas")
        .unwrap()
        .as_bool()
        .unwrap();
    let registers = output.registers.as_ref().unwrap();
    let VirtualRegister::Pauli(lhs) = &registers["twirl0"] else {
        panic!("expected a Pauli twirl register");
    };
    for randomization in 0..50 {
        for qubit in 0..2 {
            let x_bit = lhs.gates()[(qubit, randomization)] & 2 != 0;
            assert_eq!(flips[[randomization, qubit]], x_bit);
        }
    }
}

#[test]
fn conditional_branches_both_telescope() {
    // left twirl box, then a right-dressed box whose body is an if-else
    // with a CX in the then-branch only
    let mut circuit = Circuit::new(2, 1);
    circuit.add_box(Circuit::new(2, 0), vec![Twirl::left().into()], &[0, 1]);

    let mut then_body = Circuit::new(2, 1);
    then_body.cx(0, 1);
    let mut box_body = Circuit::new(2, 1);
    box_body.push(
        Operation::IfElse(IfElseOp {
            condition: (0, true),
            then_body,
            else_body: Some(Circuit::new(2, 1)),
        }),
        vec![0, 1],
        vec![0],
    );
    circuit.add_box(box_body, vec![Twirl::right().into()], &[0, 1]);

    let (template, output) = sample_template(&circuit, 20, 13);
    let values = output.get("parameter_values").unwrap();

    let with_cx = embed(&cx_matrix(), &[0, 1], 2);
    let without = identity(2);
    for randomization in 0..20 {
        let row = output_row(values, randomization);
        let then_unitary = template_unitary(&template, row.view(), true);
        assert_unitary_eq(&then_unitary, &with_cx, 1e-9);
        let else_unitary = template_unitary(&template, row.view(), false);
        assert_unitary_eq(&else_unitary, &without, 1e-9);
    }
}

#[test]
fn bound_basis_changes_rotate_the_dressing() {
    use samplex::annotations::{BasisChangeMode, ChangeBasis};

    let mut circuit = Circuit::new(2, 0);
    circuit.add_box(
        Circuit::new(2, 0),
        vec![
            Twirl::left().into(),
            Annotation::ChangeBasis(ChangeBasis {
                mode: BasisChangeMode::Meas,
                reference: "b".into(),
                dressing: DressingMode::Left,
                decomposition: DecompositionMode::RzSx,
            }),
        ],
        &[0, 1],
    );
    circuit.add_box(Circuit::new(2, 0), vec![Twirl::right().into()], &[0, 1]);

    let (template, mut samplex) = build(&circuit).unwrap();
    samplex.finalize().unwrap();

    // basis X on qubit 0, identity on qubit 1
    let mut inputs = samplex.inputs();
    inputs
        .bind("basis_changes.b", Tensor::from_u8_slice(&[2, 0]))
        .unwrap();
    let output = samplex
        .sample(&inputs, 10, &SampleOptions::default())
        .unwrap();

    // the twirl telescopes away, leaving exactly the basis change
    let x: ndarray::Array2<Complex64> = ndarray::Array2::from_shape_vec(
        (2, 2),
        vec![
            Complex64::new(0., 0.),
            Complex64::new(1., 0.),
            Complex64::new(1., 0.),
            Complex64::new(0., 0.),
        ],
    )
    .unwrap();
    let expected = embed(&x, &[0], 2);

    let values = output.get("parameter_values").unwrap();
    for randomization in 0..10 {
        let row = output_row(values, randomization);
        let unitary = template_unitary(&template.template, row.view(), true);
        assert_unitary_eq(&unitary, &expected, 1e-9);
    }
}

#[test]
fn determinism_holds_across_worker_counts_end_to_end() {
    let circuit = twirl_sandwich(|body| body.cx(0, 1), vec![Twirl::left().into()]);
    let (_, mut samplex) = build(&circuit).unwrap();
    samplex.finalize().unwrap();
    let inputs = samplex.inputs();

    let mut previous: Option<samplex::tensor::Tensor> = None;
    for workers in [1usize, 3, 6] {
        let options = SampleOptions {
            seed: 5,
            max_workers: Some(workers),
            keep_registers: false,
        };
        let output = samplex.sample(&inputs, 64, &options).unwrap();
        let values = output.get("parameter_values").unwrap().clone();
        if let Some(reference) = &previous {
            assert_eq!(&values, reference);
        }
        previous = Some(values);
    }
}
