//! Per-node-kind serializers.
//!
//! Each node kind has a stable type id, the SSV at which it was introduced,
//! and one serializer per TSV. All current kinds are at TSV 1; the registry
//! rejects unknown type ids and out-of-range TSVs with typed errors.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ndarray::{Array2, Array4, ArrayD, IxDyn};
use num_complex::Complex64;
use serde_json::{Value, json};

use crate::error::{Result, SerializationError};
use crate::noise::{NoiseModel, SparsePauliTerm};
use crate::samplex::nodes::{
    C1PastCliffordNode, ChangeBasisNode, CollectTemplateValues, CollectZ2ToOutputNode,
    CombineOperand, CombineRegistersNode, ConversionNode, CopyNode, InjectNoiseNode,
    MultiplicationNode, MultiplySide, Node, PauliPastCliffordNode, SliceRegisterNode,
    TwirlSamplingNode, U2ParametricMultiplicationNode, U2WordOp, WordAngle,
};
use crate::synths::Synth;
use virtual_registers::distributions::{
    BalancedUniformPauli, Distribution, HaarU2, UniformC1, UniformLocalC1, UniformPauli,
};
use virtual_registers::registers::{
    C1Register, PauliRegister, U2Register, VirtualKind, VirtualRegister, Z2Register,
};
use virtual_registers::tables::Conjugation;

use super::malformed;

/// The SSV at which a node type id was introduced.
fn introduced_at(type_id: &str) -> u32 {
    match type_id {
        "change_basis" => 2,
        _ => 1,
    }
}

const CURRENT_TSV: u32 = 1;

pub(super) fn serialize_node(node: &Node, ssv: u32) -> Result<Value> {
    let type_id = node.type_id();
    if introduced_at(type_id) > ssv {
        return Err(SerializationError::TypePostdatesSsv {
            type_id: leak_static(type_id),
            introduced: introduced_at(type_id),
            requested: ssv,
        }
        .into());
    }

    let fields = match node {
        Node::TwirlSampling(inner) => json!({
            "lhs_register": inner.lhs_register,
            "rhs_register": inner.rhs_register,
            "distribution": distribution_to_json(&inner.distribution),
        }),
        Node::InjectNoise(inner) => json!({
            "register": inner.register,
            "sign_register": inner.sign_register,
            "noise_ref": inner.noise_ref,
            "modifier_ref": inner.modifier_ref,
            "model": model_to_json(&inner.model),
        }),
        Node::PauliPastClifford(inner) => json!({
            "gate": inner.gate,
            "register": inner.register,
            "subsystems": inner.subsystems,
            "conjugation": conjugation_name(inner.conjugation),
        }),
        Node::C1PastClifford(inner) => json!({
            "gate": inner.gate,
            "register": inner.register,
            "subsystems": inner.subsystems,
            "conjugation": conjugation_name(inner.conjugation),
        }),
        Node::ChangeBasis(inner) => json!({
            "register": inner.register,
            "input_name": inner.input_name,
            "source_kind": inner.source_kind.name(),
            "side": side_name(inner.side),
            "subsystems": inner.subsystems,
        }),
        Node::Copy(inner) => json!({
            "register": inner.register,
            "output": inner.output,
            "kind": inner.kind.name(),
            "num_subsystems": inner.num_subsystems,
        }),
        Node::SliceRegister(inner) => json!({
            "input": inner.input,
            "output": inner.output,
            "input_kind": inner.input_kind.name(),
            "output_kind": inner.output_kind.name(),
            "slice_idxs": inner.slice_idxs,
        }),
        Node::CombineRegisters(inner) => json!({
            "output": inner.output,
            "output_kind": inner.output_kind.name(),
            "num_subsystems": inner.num_subsystems,
            "operands": inner
                .operands
                .iter()
                .map(|operand| json!({
                    "register": operand.register,
                    "kind": operand.kind.name(),
                    "mapping": operand.mapping,
                }))
                .collect::<Vec<_>>(),
        }),
        Node::Conversion(inner) => json!({
            "input": inner.input,
            "input_kind": inner.input_kind.name(),
            "output": inner.output,
            "output_kind": inner.output_kind.name(),
            "num_subsystems": inner.num_subsystems,
        }),
        Node::Multiplication(inner) => json!({
            "register": inner.register,
            "operand": register_to_json(&inner.operand),
            "subsystems": inner.subsystems,
        }),
        Node::U2ParametricMultiplication(inner) => json!({
            "register": inner.register,
            "word": inner.word.iter().map(word_op_to_json).collect::<Vec<_>>(),
            "subsystems": inner.subsystems,
        }),
        Node::CollectTemplateValues(inner) => json!({
            "register": inner.register,
            "register_kind": inner.register_kind.name(),
            "synth": inner.synth.name(),
            "subsystems": inner.subsystems,
            "template_idxs": {
                "shape": [inner.template_idxs.nrows(), inner.template_idxs.ncols()],
                "data": inner.template_idxs.iter().collect::<Vec<_>>(),
            },
        }),
        Node::CollectZ2ToOutput(inner) => json!({
            "register": inner.register,
            "subsystems": inner.subsystems,
            "output": inner.output,
            "positions": inner.positions,
        }),
    };

    Ok(json!({
        "id": type_id,
        "tsv": CURRENT_TSV,
        "fields": fields,
    }))
}

pub(super) fn deserialize_node(value: &Value) -> Result<Node> {
    let type_id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("node.id", "missing"))?;
    let tsv = value
        .get("tsv")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("node.tsv", "missing"))? as u32;
    if tsv != CURRENT_TSV {
        return Err(SerializationError::UnsupportedTsv {
            type_id: leak_static(type_id),
            found: tsv,
            min: CURRENT_TSV,
            max: CURRENT_TSV,
        }
        .into());
    }
    let fields = value
        .get("fields")
        .ok_or_else(|| malformed("node.fields", "missing"))?;

    let node = match type_id {
        "twirl_sampling" => Node::TwirlSampling(TwirlSamplingNode {
            lhs_register: string_field(fields, "lhs_register")?,
            rhs_register: string_field(fields, "rhs_register")?,
            distribution: distribution_from_json(
                fields
                    .get("distribution")
                    .ok_or_else(|| malformed("distribution", "missing"))?,
            )?,
        }),
        "inject_noise" => Node::InjectNoise(InjectNoiseNode {
            register: string_field(fields, "register")?,
            sign_register: string_field(fields, "sign_register")?,
            noise_ref: string_field(fields, "noise_ref")?,
            modifier_ref: fields
                .get("modifier_ref")
                .and_then(Value::as_str)
                .map(str::to_string),
            model: model_from_json(
                fields
                    .get("model")
                    .ok_or_else(|| malformed("model", "missing"))?,
            )?,
        }),
        "pauli_past_clifford" => Node::PauliPastClifford(PauliPastCliffordNode {
            gate: string_field(fields, "gate")?,
            register: string_field(fields, "register")?,
            subsystems: nested_usize_field(fields, "subsystems")?,
            conjugation: conjugation_from_name(&string_field(fields, "conjugation")?)?,
        }),
        "c1_past_clifford" => Node::C1PastClifford(C1PastCliffordNode {
            gate: string_field(fields, "gate")?,
            register: string_field(fields, "register")?,
            subsystems: nested_usize_field(fields, "subsystems")?,
            conjugation: conjugation_from_name(&string_field(fields, "conjugation")?)?,
        }),
        "change_basis" => Node::ChangeBasis(ChangeBasisNode {
            register: string_field(fields, "register")?,
            input_name: string_field(fields, "input_name")?,
            source_kind: kind_field(fields, "source_kind")?,
            side: side_from_name(&string_field(fields, "side")?)?,
            subsystems: usize_field(fields, "subsystems")?,
        }),
        "copy" => Node::Copy(CopyNode {
            register: string_field(fields, "register")?,
            output: string_field(fields, "output")?,
            kind: kind_field(fields, "kind")?,
            num_subsystems: scalar_field(fields, "num_subsystems")?,
        }),
        "slice_register" => Node::SliceRegister(SliceRegisterNode {
            input: string_field(fields, "input")?,
            output: string_field(fields, "output")?,
            input_kind: kind_field(fields, "input_kind")?,
            output_kind: kind_field(fields, "output_kind")?,
            slice_idxs: usize_field(fields, "slice_idxs")?,
        }),
        "combine_registers" => {
            let mut operands = Vec::new();
            for operand in fields
                .get("operands")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("operands", "missing"))?
            {
                let mapping = operand
                    .get("mapping")
                    .and_then(Value::as_array)
                    .ok_or_else(|| malformed("operands.mapping", "missing"))?
                    .iter()
                    .map(|pair| {
                        let pair = pair.as_array().filter(|entries| entries.len() == 2)?;
                        Some((
                            pair[0].as_u64()? as usize,
                            pair[1].as_u64()? as usize,
                        ))
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| malformed("operands.mapping", "expected index pairs"))?;
                operands.push(CombineOperand {
                    register: string_field(operand, "register")?,
                    kind: kind_field(operand, "kind")?,
                    mapping,
                });
            }
            Node::CombineRegisters(CombineRegistersNode {
                output: string_field(fields, "output")?,
                output_kind: kind_field(fields, "output_kind")?,
                num_subsystems: scalar_field(fields, "num_subsystems")?,
                operands,
            })
        }
        "conversion" => Node::Conversion(ConversionNode {
            input: string_field(fields, "input")?,
            input_kind: kind_field(fields, "input_kind")?,
            output: string_field(fields, "output")?,
            output_kind: kind_field(fields, "output_kind")?,
            num_subsystems: scalar_field(fields, "num_subsystems")?,
        }),
        "left_multiplication" | "right_multiplication" => {
            Node::Multiplication(MultiplicationNode {
                register: string_field(fields, "register")?,
                side: if type_id == "left_multiplication" {
                    MultiplySide::Left
                } else {
                    MultiplySide::Right
                },
                operand: register_from_json(
                    fields
                        .get("operand")
                        .ok_or_else(|| malformed("operand", "missing"))?,
                )?,
                subsystems: fields
                    .get("subsystems")
                    .filter(|value| !value.is_null())
                    .map(|value| {
                        value
                            .as_array()
                            .map(|entries| {
                                entries
                                    .iter()
                                    .map(|entry| entry.as_u64().unwrap_or_default() as usize)
                                    .collect()
                            })
                            .ok_or_else(|| malformed("subsystems", "expected an array"))
                    })
                    .transpose()?,
            })
        }
        "left_u2_parametric_multiplication" | "right_u2_parametric_multiplication" => {
            let mut word = Vec::new();
            for op in fields
                .get("word")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("word", "missing"))?
            {
                word.push(word_op_from_json(op)?);
            }
            Node::U2ParametricMultiplication(U2ParametricMultiplicationNode {
                register: string_field(fields, "register")?,
                side: if type_id == "left_u2_parametric_multiplication" {
                    MultiplySide::Left
                } else {
                    MultiplySide::Right
                },
                word,
                subsystems: usize_field(fields, "subsystems")?,
            })
        }
        "collect_template_values" => {
            let idxs = fields
                .get("template_idxs")
                .ok_or_else(|| malformed("template_idxs", "missing"))?;
            let shape = usize_field(idxs, "shape")?;
            let data = usize_field(idxs, "data")?;
            let template_idxs = Array2::from_shape_vec((shape[0], shape[1]), data)
                .map_err(|err| malformed("template_idxs", err.to_string()))?;
            Node::CollectTemplateValues(CollectTemplateValues {
                register: string_field(fields, "register")?,
                register_kind: kind_field(fields, "register_kind")?,
                synth: Synth::from_name(&string_field(fields, "synth")?)
                    .ok_or_else(|| malformed("synth", "unknown synthesizer"))?,
                subsystems: usize_field(fields, "subsystems")?,
                template_idxs,
            })
        }
        "collect_z2_to_output" => Node::CollectZ2ToOutput(CollectZ2ToOutputNode {
            register: string_field(fields, "register")?,
            subsystems: usize_field(fields, "subsystems")?,
            output: string_field(fields, "output")?,
            positions: usize_field(fields, "positions")?,
        }),
        other => {
            return Err(SerializationError::UnknownTypeId(other.to_string()).into());
        }
    };
    Ok(node)
}

// --- field helpers ------------------------------------------------------

fn leak_static(type_id: &str) -> &'static str {
    // type ids are a small closed set of static strings; map back to them
    match type_id {
        "change_basis" => "change_basis",
        "collect_template_values" => "collect_template_values",
        "collect_z2_to_output" => "collect_z2_to_output",
        "combine_registers" => "combine_registers",
        "conversion" => "conversion",
        "inject_noise" => "inject_noise",
        "left_multiplication" => "left_multiplication",
        "right_multiplication" => "right_multiplication",
        "pauli_past_clifford" => "pauli_past_clifford",
        "c1_past_clifford" => "c1_past_clifford",
        "slice_register" => "slice_register",
        "twirl_sampling" => "twirl_sampling",
        "left_u2_parametric_multiplication" => "left_u2_parametric_multiplication",
        "right_u2_parametric_multiplication" => "right_u2_parametric_multiplication",
        "copy" => "copy",
        _ => "unknown",
    }
}

fn string_field(value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(field, "missing string").into())
}

fn scalar_field(value: &Value, field: &str) -> Result<usize> {
    value
        .get(field)
        .and_then(Value::as_u64)
        .map(|entry| entry as usize)
        .ok_or_else(|| malformed(field, "missing integer").into())
}

fn usize_field(value: &Value, field: &str) -> Result<Vec<usize>> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| entry.as_u64().unwrap_or_default() as usize)
                .collect()
        })
        .ok_or_else(|| malformed(field, "missing integer array").into())
}

fn nested_usize_field(value: &Value, field: &str) -> Result<Vec<Vec<usize>>> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|entries| {
                            entries
                                .iter()
                                .map(|entry| entry.as_u64().unwrap_or_default() as usize)
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .collect()
        })
        .ok_or_else(|| malformed(field, "missing nested integer array").into())
}

fn kind_field(value: &Value, field: &str) -> Result<VirtualKind> {
    let name = string_field(value, field)?;
    VirtualKind::from_name(&name)
        .ok_or_else(|| malformed(field, format!("unknown kind '{name}'")).into())
}

fn side_name(side: MultiplySide) -> &'static str {
    match side {
        MultiplySide::Left => "left",
        MultiplySide::Right => "right",
    }
}

fn side_from_name(name: &str) -> Result<MultiplySide> {
    match name {
        "left" => Ok(MultiplySide::Left),
        "right" => Ok(MultiplySide::Right),
        other => Err(malformed("side", format!("unknown side '{other}'")).into()),
    }
}

fn conjugation_name(conjugation: Conjugation) -> &'static str {
    match conjugation {
        Conjugation::ByGate => "by_gate",
        Conjugation::ByAdjoint => "by_adjoint",
    }
}

fn conjugation_from_name(name: &str) -> Result<Conjugation> {
    match name {
        "by_gate" => Ok(Conjugation::ByGate),
        "by_adjoint" => Ok(Conjugation::ByAdjoint),
        other => Err(malformed("conjugation", format!("unknown conjugation '{other}'")).into()),
    }
}

fn word_op_to_json(op: &U2WordOp) -> Value {
    match op {
        U2WordOp::Gate(name) => json!({"gate": name}),
        U2WordOp::Rz(angle) => json!({"rz": word_angle_to_json(angle)}),
        U2WordOp::Rx(angle) => json!({"rx": word_angle_to_json(angle)}),
    }
}

fn word_angle_to_json(angle: &WordAngle) -> Value {
    match angle {
        WordAngle::Value(value) => json!({"value": value}),
        WordAngle::Param(idx) => json!({"param": idx}),
    }
}

fn word_op_from_json(value: &Value) -> Result<U2WordOp> {
    if let Some(gate) = value.get("gate").and_then(Value::as_str) {
        return Ok(U2WordOp::Gate(gate.to_string()));
    }
    for (key, constructor) in [
        ("rz", U2WordOp::Rz as fn(WordAngle) -> U2WordOp),
        ("rx", U2WordOp::Rx as fn(WordAngle) -> U2WordOp),
    ] {
        if let Some(angle) = value.get(key) {
            if let Some(raw) = angle.get("value").and_then(Value::as_f64) {
                return Ok(constructor(WordAngle::Value(raw)));
            }
            if let Some(idx) = angle.get("param").and_then(Value::as_u64) {
                return Ok(constructor(WordAngle::Param(idx as usize)));
            }
            return Err(malformed("word", "angle missing value or param").into());
        }
    }
    Err(malformed("word", "unknown word op").into())
}

fn distribution_to_json(distribution: &Distribution) -> Value {
    match distribution {
        Distribution::UniformPauli(dist) => json!({
            "type": "uniform_pauli",
            "num_subsystems": dist.num_subsystems,
        }),
        Distribution::BalancedUniformPauli(dist) => json!({
            "type": "balanced_uniform_pauli",
            "num_subsystems": dist.num_subsystems,
        }),
        Distribution::HaarU2(dist) => json!({
            "type": "haar_u2",
            "num_subsystems": dist.num_subsystems,
        }),
        Distribution::UniformC1(dist) => json!({
            "type": "uniform_c1",
            "num_subsystems": dist.num_subsystems,
        }),
        Distribution::UniformLocalC1(dist) => json!({
            "type": "uniform_local_c1",
            "num_subsystems": dist.num_subsystems(),
            "gate": dist.gate(),
        }),
    }
}

fn distribution_from_json(value: &Value) -> Result<Distribution> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("distribution.type", "missing"))?;
    let num_subsystems = scalar_field(value, "num_subsystems")?;
    let distribution = match kind {
        "uniform_pauli" => UniformPauli::new(num_subsystems).into(),
        "balanced_uniform_pauli" => BalancedUniformPauli::new(num_subsystems).into(),
        "haar_u2" => HaarU2::new(num_subsystems).into(),
        "uniform_c1" => UniformC1::new(num_subsystems).into(),
        "uniform_local_c1" => {
            let gate = string_field(value, "gate")?;
            UniformLocalC1::new(num_subsystems, &gate)
                .map_err(crate::error::Error::Register)?
                .into()
        }
        other => {
            return Err(
                malformed("distribution.type", format!("unknown type '{other}'")).into(),
            );
        }
    };
    Ok(distribution)
}

fn model_to_json(model: &NoiseModel) -> Value {
    json!({
        "num_qubits": model.num_qubits(),
        "terms": model
            .terms()
            .iter()
            .map(|term| json!({"paulis": term.paulis, "qubits": term.qubits}))
            .collect::<Vec<_>>(),
    })
}

fn model_from_json(value: &Value) -> Result<NoiseModel> {
    let num_qubits = scalar_field(value, "num_qubits")?;
    let mut terms = Vec::new();
    for term in value
        .get("terms")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("model.terms", "missing"))?
    {
        let paulis: Vec<u8> = term
            .get("paulis")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("model.terms.paulis", "missing"))?
            .iter()
            .map(|entry| entry.as_u64().unwrap_or_default() as u8)
            .collect();
        let qubits = usize_field(term, "qubits")?;
        terms.push(SparsePauliTerm::new(paulis, qubits));
    }
    Ok(NoiseModel::new(num_qubits, terms))
}

// --- register payloads --------------------------------------------------

fn register_to_json(register: &VirtualRegister) -> Value {
    let shape = vec![register.num_subsystems(), register.num_randomizations()];
    let (kind, data): (&str, Vec<u8>) = match register {
        VirtualRegister::Pauli(reg) => ("pauli", reg.gates().iter().copied().collect()),
        VirtualRegister::C1(reg) => ("c1", reg.gates().iter().copied().collect()),
        VirtualRegister::Z2(reg) => ("z2", reg.bits().iter().map(|&bit| bit as u8).collect()),
        VirtualRegister::U2(reg) => {
            let mut bytes = Vec::new();
            for value in reg.gates().iter() {
                bytes.extend_from_slice(&value.re.to_le_bytes());
                bytes.extend_from_slice(&value.im.to_le_bytes());
            }
            ("u2", bytes)
        }
    };
    json!({
        "kind": kind,
        "shape": shape,
        "data": BASE64.encode(data),
    })
}

fn register_from_json(value: &Value) -> Result<VirtualRegister> {
    let kind = string_field(value, "kind")?;
    let shape = usize_field(value, "shape")?;
    if shape.len() != 2 {
        return Err(malformed("register.shape", "expected two axes").into());
    }
    let bytes = BASE64
        .decode(string_field(value, "data")?)
        .map_err(|err| malformed("register.data", err.to_string()))?;

    let register = match kind.as_str() {
        "pauli" => VirtualRegister::Pauli(PauliRegister::new(
            shaped_u8(&bytes, (shape[0], shape[1]))?,
        )),
        "c1" => VirtualRegister::C1(
            C1Register::new(shaped_u8(&bytes, (shape[0], shape[1]))?)
                .map_err(crate::error::Error::Register)?,
        ),
        "z2" => VirtualRegister::Z2(Z2Register::new(
            shaped_u8(&bytes, (shape[0], shape[1]))?.mapv(|entry| entry != 0),
        )),
        "u2" => {
            let values: Vec<Complex64> = bytes
                .chunks_exact(16)
                .map(|chunk| {
                    Complex64::new(
                        f64::from_le_bytes(chunk[..8].try_into().expect("chunked by 16")),
                        f64::from_le_bytes(chunk[8..].try_into().expect("chunked by 16")),
                    )
                })
                .collect();
            let array = Array4::from_shape_vec((shape[0], shape[1], 2, 2), values)
                .map_err(|err| malformed("register.data", err.to_string()))?;
            VirtualRegister::U2(U2Register::new(array))
        }
        other => {
            return Err(malformed("register.kind", format!("unknown kind '{other}'")).into());
        }
    };
    Ok(register)
}

fn shaped_u8(bytes: &[u8], shape: (usize, usize)) -> Result<Array2<u8>> {
    let array = ArrayD::from_shape_vec(IxDyn(&[shape.0, shape.1]), bytes.to_vec())
        .map_err(|err| malformed("register.data", err.to_string()))?;
    Ok(array
        .into_dimensionality()
        .expect("two axes by construction"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_ids_are_rejected() {
        let value = json!({"id": "mystery", "tsv": 1, "fields": {}});
        assert!(matches!(
            deserialize_node(&value),
            Err(crate::error::Error::Serialization(
                SerializationError::UnknownTypeId(_)
            ))
        ));
    }

    #[test]
    fn out_of_range_tsv_is_rejected() {
        let value = json!({"id": "copy", "tsv": 7, "fields": {}});
        assert!(matches!(
            deserialize_node(&value),
            Err(crate::error::Error::Serialization(
                SerializationError::UnsupportedTsv { .. }
            ))
        ));
    }

    #[test]
    fn change_basis_cannot_be_written_at_ssv_1() {
        let node = Node::ChangeBasis(ChangeBasisNode {
            register: "dressing".into(),
            input_name: "basis_changes.b".into(),
            source_kind: VirtualKind::Pauli,
            side: MultiplySide::Left,
            subsystems: vec![0],
        });
        assert!(matches!(
            serialize_node(&node, 1),
            Err(crate::error::Error::Serialization(
                SerializationError::TypePostdatesSsv { .. }
            ))
        ));
        assert!(serialize_node(&node, 2).is_ok());
    }

    #[test]
    fn registers_round_trip() {
        use ndarray::array;
        let register: VirtualRegister = PauliRegister::new(array![[0, 1], [2, 3]]).into();
        let decoded = register_from_json(&register_to_json(&register)).unwrap();
        assert_eq!(decoded, register);

        let unitary: VirtualRegister = U2Register::identity(2, 3).into();
        let decoded = register_from_json(&register_to_json(&unitary)).unwrap();
        assert_eq!(decoded, unitary);
    }

    #[test]
    fn nodes_round_trip() {
        let node = Node::CollectTemplateValues(CollectTemplateValues {
            register: "dressing0".into(),
            register_kind: VirtualKind::U2,
            synth: Synth::RzSx,
            subsystems: vec![0, 1],
            template_idxs: ndarray::array![[0, 1, 2], [3, 4, 5]],
        });
        let encoded = serialize_node(&node, SSV_CURRENT).unwrap();
        let decoded = deserialize_node(&encoded).unwrap();
        let Node::CollectTemplateValues(decoded) = decoded else {
            panic!("wrong node kind");
        };
        assert_eq!(decoded.register, "dressing0");
        assert_eq!(decoded.template_idxs, ndarray::array![[0, 1, 2], [3, 4, 5]]);
    }

    const SSV_CURRENT: u32 = super::super::SSV;
}
