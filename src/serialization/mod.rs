//! Samplex serialization: a JSON node-link format with a two-level version
//! contract.
//!
//! The envelope carries the Samplex Serialization Version (`ssv`) and the
//! package version. The header holds the parameter expression table (as
//! base64 expression blobs), the interface specifications, the passthrough
//! map, and the noise requirements; the node list serializes each node as a
//! stable type-id string, a per-type serialization version (`tsv`), and a
//! field dictionary.
//!
//! The SSV is independent of the package version: loading data outside
//! `[SSV_MIN_SUPPORTED, SSV]` fails, and writing at an older SSV is allowed
//! only when every node kind present predates it.

mod node_serializers;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value, json};

use crate::circuit::ParamExpr;
use crate::error::{Result, SerializationError};
use crate::noise::NoiseRequirement;
use crate::samplex::Samplex;
use crate::tensor::{Dtype, Tensor, TensorSpec};
use ndarray::{ArrayD, IxDyn};

/// The latest samplex serialization version this package writes.
pub const SSV: u32 = 2;

/// The oldest samplex serialization version this package can read.
pub const SSV_MIN_SUPPORTED: u32 = 1;

/// The package version recorded in the envelope.
const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> SerializationError {
    SerializationError::Malformed {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Serializes a samplex at the latest SSV.
pub fn samplex_to_json(samplex: &Samplex) -> Result<String> {
    samplex_to_json_at(samplex, SSV)
}

/// Serializes a samplex at a caller-specified SSV, failing when any node
/// kind present postdates that version.
pub fn samplex_to_json_at(samplex: &Samplex, ssv: u32) -> Result<String> {
    if !(SSV_MIN_SUPPORTED..=SSV).contains(&ssv) {
        return Err(SerializationError::UnsupportedSsv {
            found: ssv,
            min: SSV_MIN_SUPPORTED,
            max: SSV,
        }
        .into());
    }

    let mut index_of = std::collections::HashMap::new();
    let mut nodes = Vec::new();
    for (position, (node_idx, node)) in samplex.nodes().enumerate() {
        index_of.insert(node_idx, position);
        nodes.push(node_serializers::serialize_node(node, ssv)?);
    }
    let edges: Vec<Value> = samplex
        .edges()
        .into_iter()
        .map(|(from, to)| json!([index_of[&from], index_of[&to]]))
        .collect();

    let header = json!({
        "expressions": samplex
            .param_table()
            .expressions()
            .iter()
            .map(|expression| Value::String(encode_expression(expression)))
            .collect::<Vec<_>>(),
        "passthrough": samplex
            .passthrough_params()
            .iter()
            .map(|&(template_idx, expression_idx)| json!([template_idx, expression_idx]))
            .collect::<Vec<_>>(),
        "num_template_params": samplex.num_template_params(),
        "inputs": samplex.input_specs().map(spec_to_json).collect::<Vec<_>>(),
        "outputs": samplex.output_specs().map(spec_to_json).collect::<Vec<_>>(),
        "noise_requirements": samplex
            .noise_requirements()
            .map(requirement_to_json)
            .collect::<Vec<_>>(),
        "finalized": samplex.is_finalized(),
    });

    let envelope = json!({
        "ssv": ssv,
        "version": PACKAGE_VERSION,
        "header": header,
        "nodes": nodes,
        "edges": edges,
    });
    serde_json::to_string(&envelope).map_err(|err| SerializationError::Json(err).into())
}

/// Deserializes a samplex, enforcing the SSV support range.
pub fn samplex_from_json(data: &str) -> Result<Samplex> {
    let envelope: Value =
        serde_json::from_str(data).map_err(SerializationError::Json)?;
    let ssv = envelope
        .get("ssv")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("ssv", "missing or non-integer"))? as u32;
    if !(SSV_MIN_SUPPORTED..=SSV).contains(&ssv) {
        return Err(SerializationError::UnsupportedSsv {
            found: ssv,
            min: SSV_MIN_SUPPORTED,
            max: SSV,
        }
        .into());
    }

    let header = envelope
        .get("header")
        .ok_or_else(|| malformed("header", "missing"))?;
    let mut samplex = Samplex::new();

    for blob in header
        .get("expressions")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("header.expressions", "missing"))?
    {
        let blob = blob
            .as_str()
            .ok_or_else(|| malformed("header.expressions", "non-string blob"))?;
        samplex.append_parameter_expression(decode_expression(blob)?);
    }

    let mut passthrough = Vec::new();
    for pair in header
        .get("passthrough")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("header.passthrough", "missing"))?
    {
        let entries = pair
            .as_array()
            .filter(|entries| entries.len() == 2)
            .ok_or_else(|| malformed("header.passthrough", "expected pairs"))?;
        passthrough.push((
            entries[0].as_u64().unwrap_or_default() as usize,
            entries[1].as_u64().unwrap_or_default() as usize,
        ));
    }
    samplex.set_passthrough_params(passthrough);
    if let Some(count) = header.get("num_template_params").and_then(Value::as_u64) {
        samplex.set_num_template_params(count as usize);
    }

    for spec in header
        .get("inputs")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("header.inputs", "missing"))?
    {
        samplex.add_input(spec_from_json(spec)?, true)?;
    }
    for spec in header
        .get("outputs")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("header.outputs", "missing"))?
    {
        samplex.add_output(spec_from_json(spec)?)?;
    }
    for requirement in header
        .get("noise_requirements")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("header.noise_requirements", "missing"))?
    {
        samplex.add_noise_requirement(requirement_from_json(requirement)?)?;
    }

    let mut node_indices = Vec::new();
    for node in envelope
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("nodes", "missing"))?
    {
        let node = node_serializers::deserialize_node(node)?;
        node_indices.push(samplex.add_node(node)?);
    }
    for edge in envelope
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("edges", "missing"))?
    {
        let entries = edge
            .as_array()
            .filter(|entries| entries.len() == 2)
            .ok_or_else(|| malformed("edges", "expected pairs"))?;
        let from = entries[0].as_u64().unwrap_or_default() as usize;
        let to = entries[1].as_u64().unwrap_or_default() as usize;
        samplex.add_edge(node_indices[from], node_indices[to])?;
    }

    if header
        .get("finalized")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        samplex.finalize()?;
    }
    Ok(samplex)
}

// --- expression blobs ---------------------------------------------------

/// Postfix binary encoding of a parameter expression, base64-wrapped.
fn encode_expression(expression: &ParamExpr) -> String {
    let mut bytes = Vec::new();
    encode_expression_into(expression, &mut bytes);
    BASE64.encode(bytes)
}

fn encode_expression_into(expression: &ParamExpr, bytes: &mut Vec<u8>) {
    match expression {
        ParamExpr::Constant(value) => {
            bytes.push(0);
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        ParamExpr::Parameter(name) => {
            bytes.push(1);
            let name_bytes = name.as_bytes();
            bytes.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
            bytes.extend_from_slice(name_bytes);
        }
        ParamExpr::Neg(inner) => {
            encode_expression_into(inner, bytes);
            bytes.push(2);
        }
        ParamExpr::Add(lhs, rhs) => {
            encode_expression_into(lhs, bytes);
            encode_expression_into(rhs, bytes);
            bytes.push(3);
        }
        ParamExpr::Sub(lhs, rhs) => {
            encode_expression_into(lhs, bytes);
            encode_expression_into(rhs, bytes);
            bytes.push(4);
        }
        ParamExpr::Mul(lhs, rhs) => {
            encode_expression_into(lhs, bytes);
            encode_expression_into(rhs, bytes);
            bytes.push(5);
        }
    }
}

fn decode_expression(blob: &str) -> Result<ParamExpr> {
    let bytes = BASE64
        .decode(blob)
        .map_err(|err| malformed("expression", err.to_string()))?;
    let mut stack: Vec<ParamExpr> = Vec::new();
    let mut cursor = 0usize;
    let pop2 = |stack: &mut Vec<ParamExpr>| -> Result<(ParamExpr, ParamExpr)> {
        let rhs = stack
            .pop()
            .ok_or_else(|| malformed("expression", "stack underflow"))?;
        let lhs = stack
            .pop()
            .ok_or_else(|| malformed("expression", "stack underflow"))?;
        Ok((lhs, rhs))
    };
    while cursor < bytes.len() {
        match bytes[cursor] {
            0 => {
                let end = cursor + 9;
                let slice = bytes
                    .get(cursor + 1..end)
                    .ok_or_else(|| malformed("expression", "truncated constant"))?;
                stack.push(ParamExpr::Constant(f64::from_le_bytes(
                    slice.try_into().expect("slice length checked"),
                )));
                cursor = end;
            }
            1 => {
                let len_slice = bytes
                    .get(cursor + 1..cursor + 3)
                    .ok_or_else(|| malformed("expression", "truncated name length"))?;
                let len = u16::from_le_bytes(len_slice.try_into().expect("length checked")) as usize;
                let end = cursor + 3 + len;
                let name = bytes
                    .get(cursor + 3..end)
                    .ok_or_else(|| malformed("expression", "truncated name"))?;
                stack.push(ParamExpr::Parameter(
                    String::from_utf8(name.to_vec())
                        .map_err(|err| malformed("expression", err.to_string()))?,
                ));
                cursor = end;
            }
            2 => {
                let inner = stack
                    .pop()
                    .ok_or_else(|| malformed("expression", "stack underflow"))?;
                stack.push(ParamExpr::Neg(Box::new(inner)));
                cursor += 1;
            }
            opcode @ 3..=5 => {
                let (lhs, rhs) = pop2(&mut stack)?;
                stack.push(match opcode {
                    3 => ParamExpr::Add(Box::new(lhs), Box::new(rhs)),
                    4 => ParamExpr::Sub(Box::new(lhs), Box::new(rhs)),
                    _ => ParamExpr::Mul(Box::new(lhs), Box::new(rhs)),
                });
                cursor += 1;
            }
            opcode => {
                return Err(malformed("expression", format!("unknown opcode {opcode}")).into());
            }
        }
    }
    let expression = stack
        .pop()
        .ok_or_else(|| malformed("expression", "empty blob"))?;
    if !stack.is_empty() {
        return Err(malformed("expression", "trailing operands").into());
    }
    Ok(expression)
}

// --- tensors and specifications -----------------------------------------

pub(crate) fn tensor_to_json(tensor: &Tensor) -> Value {
    let (dtype, data) = match tensor {
        Tensor::F64(array) => {
            let mut bytes = Vec::with_capacity(array.len() * 8);
            for value in array.iter() {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            ("f64", bytes)
        }
        Tensor::Bool(array) => ("bool", array.iter().map(|&bit| bit as u8).collect()),
        Tensor::U8(array) => ("u8", array.iter().copied().collect()),
    };
    json!({
        "dtype": dtype,
        "shape": tensor.shape(),
        "data": BASE64.encode(data),
    })
}

pub(crate) fn tensor_from_json(value: &Value) -> Result<Tensor> {
    let dtype = value
        .get("dtype")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("tensor.dtype", "missing"))?;
    let shape: Vec<usize> = value
        .get("shape")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("tensor.shape", "missing"))?
        .iter()
        .map(|entry| entry.as_u64().unwrap_or_default() as usize)
        .collect();
    let bytes = BASE64
        .decode(
            value
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("tensor.data", "missing"))?,
        )
        .map_err(|err| malformed("tensor.data", err.to_string()))?;

    let tensor = match dtype {
        "f64" => {
            let values: Vec<f64> = bytes
                .chunks_exact(8)
                .map(|chunk| f64::from_le_bytes(chunk.try_into().expect("chunked by 8")))
                .collect();
            Tensor::F64(
                ArrayD::from_shape_vec(IxDyn(&shape), values)
                    .map_err(|err| malformed("tensor", err.to_string()))?,
            )
        }
        "bool" => Tensor::Bool(
            ArrayD::from_shape_vec(IxDyn(&shape), bytes.iter().map(|&b| b != 0).collect())
                .map_err(|err| malformed("tensor", err.to_string()))?,
        ),
        "u8" => Tensor::U8(
            ArrayD::from_shape_vec(IxDyn(&shape), bytes)
                .map_err(|err| malformed("tensor", err.to_string()))?,
        ),
        other => return Err(malformed("tensor.dtype", format!("unknown dtype '{other}'")).into()),
    };
    Ok(tensor)
}

fn spec_to_json(spec: &TensorSpec) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), Value::String(spec.name.clone()));
    map.insert("shape".into(), json!(spec.shape));
    map.insert("dtype".into(), Value::String(spec.dtype.name().into()));
    map.insert("description".into(), Value::String(spec.description.clone()));
    map.insert("optional".into(), Value::Bool(spec.optional));
    if let Some(default) = &spec.default {
        map.insert("default".into(), tensor_to_json(default));
    }
    Value::Object(map)
}

fn spec_from_json(value: &Value) -> Result<TensorSpec> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("spec.name", "missing"))?;
    let shape: Vec<usize> = value
        .get("shape")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("spec.shape", "missing"))?
        .iter()
        .map(|entry| entry.as_u64().unwrap_or_default() as usize)
        .collect();
    let dtype = value
        .get("dtype")
        .and_then(Value::as_str)
        .and_then(Dtype::from_name)
        .ok_or_else(|| malformed("spec.dtype", "missing or unknown"))?;
    let mut spec = TensorSpec::new(name, &shape, dtype);
    if let Some(description) = value.get("description").and_then(Value::as_str) {
        spec = spec.describe(description);
    }
    if value
        .get("optional")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        spec = spec.optional();
    }
    if let Some(default) = value.get("default") {
        spec = spec.with_default(tensor_from_json(default)?);
    }
    Ok(spec)
}

fn requirement_to_json(requirement: &NoiseRequirement) -> Value {
    json!({
        "noise_ref": requirement.noise_ref,
        "num_qubits": requirement.num_qubits,
        "num_terms": requirement.num_terms,
        "noise_modifiers": requirement.noise_modifiers.iter().collect::<Vec<_>>(),
    })
}

fn requirement_from_json(value: &Value) -> Result<NoiseRequirement> {
    Ok(NoiseRequirement {
        noise_ref: value
            .get("noise_ref")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("noise_requirement.noise_ref", "missing"))?
            .to_string(),
        num_qubits: value
            .get("num_qubits")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize,
        num_terms: value
            .get("num_terms")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize,
        noise_modifiers: value
            .get("noise_modifiers")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expressions_round_trip() {
        let expression = ParamExpr::Mul(
            Box::new(ParamExpr::Sub(
                Box::new(ParamExpr::parameter("theta")),
                Box::new(ParamExpr::Constant(0.5)),
            )),
            Box::new(ParamExpr::Neg(Box::new(ParamExpr::parameter("phi")))),
        );
        let decoded = decode_expression(&encode_expression(&expression)).unwrap();
        assert_eq!(decoded, expression);
    }

    #[test]
    fn tensors_round_trip() {
        let tensor = Tensor::from_f64_slice(&[1.5, -2.0, 0.0]);
        let decoded = tensor_from_json(&tensor_to_json(&tensor)).unwrap();
        assert_eq!(decoded, tensor);

        let bits = Tensor::zeros(Dtype::Bool, &[2, 3]);
        assert_eq!(tensor_from_json(&tensor_to_json(&bits)).unwrap(), bits);
    }

    #[test]
    fn ssv_out_of_range_is_rejected() {
        let samplex = Samplex::new();
        let data = samplex_to_json(&samplex).unwrap();
        let mut envelope: Value = serde_json::from_str(&data).unwrap();
        envelope["ssv"] = json!(SSV_MIN_SUPPORTED - 1);
        let result = samplex_from_json(&serde_json::to_string(&envelope).unwrap());
        assert!(matches!(
            result,
            Err(crate::error::Error::Serialization(
                SerializationError::UnsupportedSsv { .. }
            ))
        ));
    }
}
