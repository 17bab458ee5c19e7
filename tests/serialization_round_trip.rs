//! Serialization tests: round-tripped samplexes must execute identically,
//! and version-contract violations must fail with typed errors.

use samplex::annotations::Twirl;
use samplex::circuit::Circuit;
use samplex::error::{Error, SerializationError};
use samplex::noise::NoiseModel;
use samplex::prelude::*;
use samplex::samplex::SampleOptions;
use samplex::serialization::{SSV, SSV_MIN_SUPPORTED, samplex_to_json_at};

fn noisy_twirl_circuit() -> Circuit {
    let mut circuit = Circuit::new(2, 0);
    let mut body = Circuit::new(2, 0);
    body.h(0);
    body.cx(0, 1);
    circuit.add_box(
        body,
        vec![
            Twirl::left().into(),
            InjectNoise::new("my_noise", NoiseModel::from_labels(2, &["XX", "IZ"]).unwrap()).into(),
        ],
        &[0, 1],
    );
    circuit.add_box(Circuit::new(2, 0), vec![Twirl::right().into()], &[0, 1]);
    circuit
}

#[test]
fn round_tripped_samplex_executes_identically() {
    let circuit = noisy_twirl_circuit();
    let (_, mut samplex) = build(&circuit).unwrap();
    samplex.finalize().unwrap();

    let encoded = samplex_to_json(&samplex).unwrap();
    let mut restored = samplex_from_json(&encoded).unwrap();
    if !restored.is_finalized() {
        restored.finalize().unwrap();
    }

    let bind = |samplex: &samplex::Samplex| {
        let mut inputs = samplex.inputs();
        inputs
            .bind("noise_maps.my_noise", Tensor::from_f64_slice(&[0.3, 0.1]))
            .unwrap();
        inputs
    };
    let options = SampleOptions {
        seed: 17,
        ..SampleOptions::default()
    };
    let original_output = samplex.sample(&bind(&samplex), 30, &options).unwrap();
    let restored_output = restored.sample(&bind(&restored), 30, &options).unwrap();

    for name in ["parameter_values", "noise_signs.my_noise"] {
        assert_eq!(
            original_output.get(name).unwrap(),
            restored_output.get(name).unwrap(),
            "output '{name}' differs after a round trip"
        );
    }
}

#[test]
fn serialized_interfaces_survive_the_round_trip() {
    let circuit = noisy_twirl_circuit();
    let (_, mut samplex) = build(&circuit).unwrap();
    samplex.finalize().unwrap();

    let restored = samplex_from_json(&samplex_to_json(&samplex).unwrap()).unwrap();
    assert_eq!(restored.num_template_params(), samplex.num_template_params());
    assert_eq!(restored.num_nodes(), samplex.num_nodes());

    let requirement = restored.noise_requirements().next().unwrap();
    assert_eq!(requirement.noise_ref, "my_noise");
    assert_eq!(requirement.num_qubits, 2);
    assert_eq!(requirement.num_terms, 2);

    let input_names: Vec<&str> = restored
        .input_specs()
        .map(|spec| spec.name.as_str())
        .collect();
    assert!(input_names.contains(&"noise_maps.my_noise"));
}

#[test]
fn loading_an_unsupported_ssv_fails() {
    let circuit = noisy_twirl_circuit();
    let (_, samplex) = build(&circuit).unwrap();
    let encoded = samplex_to_json(&samplex).unwrap();

    let mut envelope: serde_json::Value = serde_json::from_str(&encoded).unwrap();
    envelope["ssv"] = serde_json::json!(SSV + 1);
    let result = samplex_from_json(&serde_json::to_string(&envelope).unwrap());
    assert!(matches!(
        result,
        Err(Error::Serialization(SerializationError::UnsupportedSsv {
            found,
            ..
        })) if found == SSV + 1
    ));

    envelope["ssv"] = serde_json::json!(SSV_MIN_SUPPORTED - 1);
    let result = samplex_from_json(&serde_json::to_string(&envelope).unwrap());
    assert!(matches!(
        result,
        Err(Error::Serialization(SerializationError::UnsupportedSsv { .. }))
    ));
}

#[test]
fn writing_at_an_out_of_range_ssv_fails() {
    let samplex = samplex::Samplex::new();
    assert!(matches!(
        samplex_to_json_at(&samplex, SSV + 1),
        Err(Error::Serialization(SerializationError::UnsupportedSsv { .. }))
    ));
}

#[test]
fn older_ssv_supports_samplexes_without_newer_node_kinds() {
    // a plain twirl samplex only uses kinds introduced at SSV 1
    let mut circuit = Circuit::new(1, 0);
    circuit.add_box(Circuit::new(1, 0), vec![Twirl::left().into()], &[0]);
    circuit.add_box(Circuit::new(1, 0), vec![Twirl::right().into()], &[0]);
    let (_, samplex) = build(&circuit).unwrap();
    assert!(samplex_to_json_at(&samplex, SSV_MIN_SUPPORTED).is_ok());
}
