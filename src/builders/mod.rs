//! Builders: walking the annotated input circuit to produce the template
//! circuit and the pre-samplex.

mod box_builder;
mod dynamic_builder;
mod specs;
mod template_state;

pub use box_builder::{BoxBuilder, MEASUREMENT_FLIPS};
pub use specs::{BasisSpec, CollectionSpec, EmissionSpec, NoiseSpec};
pub use template_state::TemplateState;

use crate::annotations::{
    Annotation, ChangeBasis, DressingMode, GroupMode, InjectLocalClifford, InjectNoise, Twirl,
};
use crate::circuit::{Angle, BoxOp, Circuit, Gate, Instruction, Operation};
use crate::error::{BuildError, Result, SamplexBuildError};
use crate::partition::{AddOutcome, QubitPartition};
use crate::pre_samplex::{PreSamplex, PropagateOp};
use crate::synths::Synth;
use virtual_registers::registers::VirtualKind;
use virtual_registers::tables::{is_one_qubit_gate, is_two_qubit_gate};

/// Walks the input circuit, producing the template state and the
/// pre-samplex. The caller finalizes the pre-samplex into a samplex.
pub fn pre_build(circuit: &Circuit) -> Result<(TemplateState, PreSamplex)> {
    let mut template = TemplateState::new(circuit.num_qubits, circuit.num_clbits);
    let mut pre = PreSamplex::new(circuit.num_clbits);

    for instruction in &circuit.instructions {
        match &instruction.operation {
            Operation::Box(box_op) => {
                build_box(&mut template, &mut pre, box_op, &instruction.qubits)?;
            }
            _ => passthrough_instruction(&mut template, &mut pre, instruction)?,
        }
    }
    Ok((template, pre))
}

/// Builds the template and samplex for one circuit in a single call.
pub fn build(circuit: &Circuit) -> Result<(TemplateState, crate::samplex::Samplex)> {
    let (template, pre) = pre_build(circuit)?;
    let mut samplex = pre.finalize()?;
    samplex.set_num_template_params(template.num_params());
    Ok((template, samplex))
}

fn build_box(
    template: &mut TemplateState,
    pre: &mut PreSamplex,
    box_op: &BoxOp,
    outer_qubits: &[usize],
) -> Result<()> {
    if box_op.annotations.is_empty() {
        // an unannotated box is inlined transparently
        for instruction in &box_op.body.instructions {
            let remapped = Instruction {
                operation: instruction.operation.clone(),
                qubits: instruction
                    .qubits
                    .iter()
                    .map(|&body_qubit| outer_qubits[body_qubit])
                    .collect(),
                clbits: instruction.clbits.clone(),
            };
            passthrough_instruction(template, pre, &remapped)?;
        }
        return Ok(());
    }

    let (collection, emission) = parse_annotations(box_op, outer_qubits)?;
    let builder = BoxBuilder::new(template, pre, collection.clone(), emission);
    match collection.dressing.unwrap_or(DressingMode::Left) {
        DressingMode::Left => builder.run_left(box_op, outer_qubits),
        DressingMode::Right => builder.run_right(box_op, outer_qubits),
    }
}

/// Handles instructions outside of annotated boxes. Clifford gates forward
/// any open register flows; non-Clifford gates may not sit on an open flow.
fn passthrough_instruction(
    template: &mut TemplateState,
    pre: &mut PreSamplex,
    instruction: &Instruction,
) -> Result<()> {
    match &instruction.operation {
        Operation::Barrier(_) | Operation::Measure => {
            template.append(instruction.clone());
        }
        Operation::Gate(gate) => {
            let crosses = pre.has_open_flows(&instruction.qubits);
            if gate.is_parametric() {
                if crosses {
                    return Err(SamplexBuildError::NonCliffordBetweenDressings.into());
                }
                let Some(Angle::Expr(expr)) = gate.angle() else {
                    return Err(SamplexBuildError::UnsupportedBoxInstruction(
                        gate.name().to_string(),
                    )
                    .into());
                };
                let expression_idx = pre.param_table.append(expr.clone());
                let template_idx = template.param_iter.advance();
                pre.passthrough.push((template_idx, expression_idx));
                let placeholder = match gate {
                    Gate::Rz(_) => Gate::Rz(Angle::Index(template_idx)),
                    Gate::Rx(_) => Gate::Rx(Angle::Index(template_idx)),
                    _ => unreachable!("only rotations are parametric"),
                };
                template.append(Instruction {
                    operation: Operation::Gate(placeholder),
                    qubits: instruction.qubits.clone(),
                    clbits: instruction.clbits.clone(),
                });
                return Ok(());
            }
            if crosses {
                match gate.num_qubits() {
                    1 if is_one_qubit_gate(gate.name()) => {
                        pre.add_propagate(PropagateOp::SingleClifford {
                            gate: gate.name().to_string(),
                            qubit: instruction.qubits[0],
                        })?;
                    }
                    2 if is_two_qubit_gate(gate.name()) => {
                        pre.add_propagate(PropagateOp::Entangler {
                            gate: gate.name().to_string(),
                            qubits: (instruction.qubits[0], instruction.qubits[1]),
                        })?;
                    }
                    _ => {
                        return Err(SamplexBuildError::UnsupportedEntangler(
                            gate.name().to_string(),
                        )
                        .into());
                    }
                }
            }
            template.append(instruction.clone());
        }
        Operation::IfElse(_) => {
            if pre.has_open_flows(&instruction.qubits) {
                return Err(SamplexBuildError::NonCliffordBetweenDressings.into());
            }
            template.append(instruction.clone());
        }
        Operation::Box(box_op) => {
            build_box(template, pre, box_op, &instruction.qubits)?;
        }
    }
    Ok(())
}

/// Parses the annotation set of a box into collection and emission specs,
/// rejecting conflicting or duplicated annotations.
fn parse_annotations(
    box_op: &BoxOp,
    outer_qubits: &[usize],
) -> Result<(CollectionSpec, EmissionSpec)> {
    let mut sorted_qubits = outer_qubits.to_vec();
    sorted_qubits.sort_unstable();
    let mut collection = CollectionSpec::new(sorted_qubits.clone());
    let mut emission = EmissionSpec::new(sorted_qubits);

    let mut seen: Vec<&'static str> = Vec::new();
    for annotation in &box_op.annotations {
        let kind = annotation.kind_name();
        if seen.contains(&kind) {
            return Err(BuildError::DuplicateAnnotation(kind).into());
        }
        seen.push(kind);
        match annotation {
            Annotation::Twirl(twirl) => parse_twirl(twirl, &mut collection, &mut emission)?,
            Annotation::ChangeBasis(change_basis) => {
                parse_change_basis(change_basis, &mut collection, &mut emission)?;
            }
            Annotation::InjectLocalClifford(inject) => {
                parse_inject_local_clifford(inject, &mut collection, &mut emission)?;
            }
            Annotation::InjectNoise(inject) => {
                parse_inject_noise(inject, &mut emission)?;
            }
        }
    }

    if emission.noise.is_some() && emission.twirl_group.is_none() {
        return Err(BuildError::NoiseWithoutTwirl.into());
    }

    if emission
        .twirl_group
        .is_some_and(GroupMode::is_gate_dependent)
    {
        classify_gate_dependent_twirl(box_op, outer_qubits, &mut emission)?;
    }

    Ok((collection, emission))
}

fn merge_synth(collection: &mut CollectionSpec, synth: Synth) -> Result<()> {
    match collection.synth {
        Some(current) if current != synth => Err(BuildError::ConflictingSynths.into()),
        _ => {
            collection.synth = Some(synth);
            Ok(())
        }
    }
}

fn merge_dressing(collection: &mut CollectionSpec, dressing: DressingMode) -> Result<()> {
    match collection.dressing {
        Some(current) if current != dressing => Err(BuildError::ConflictingDressings.into()),
        _ => {
            collection.dressing = Some(dressing);
            Ok(())
        }
    }
}

fn parse_twirl(
    twirl: &Twirl,
    collection: &mut CollectionSpec,
    emission: &mut EmissionSpec,
) -> Result<()> {
    emission.twirl_group = Some(twirl.group);
    merge_synth(collection, synth_of(twirl.decomposition))?;
    merge_dressing(collection, twirl.dressing)
}

fn parse_change_basis(
    change_basis: &ChangeBasis,
    collection: &mut CollectionSpec,
    emission: &mut EmissionSpec,
) -> Result<()> {
    if emission.basis.is_some() {
        return Err(BuildError::MultipleFrameChanges.into());
    }
    emission.basis = Some(BasisSpec {
        input_name: format!("basis_changes.{}", change_basis.reference),
        source_kind: VirtualKind::Pauli,
        mode: change_basis.mode,
    });
    merge_synth(collection, synth_of(change_basis.decomposition))?;
    merge_dressing(collection, change_basis.dressing)
}

fn parse_inject_local_clifford(
    inject: &InjectLocalClifford,
    collection: &mut CollectionSpec,
    emission: &mut EmissionSpec,
) -> Result<()> {
    if emission.basis.is_some() {
        return Err(BuildError::MultipleFrameChanges.into());
    }
    emission.basis = Some(BasisSpec {
        input_name: format!("local_cliffords.{}", inject.reference),
        source_kind: VirtualKind::C1,
        mode: match inject.dressing {
            DressingMode::Left => crate::annotations::BasisChangeMode::Meas,
            DressingMode::Right => crate::annotations::BasisChangeMode::Prep,
        },
    });
    merge_synth(collection, synth_of(inject.decomposition))?;
    merge_dressing(collection, inject.dressing)
}

fn parse_inject_noise(inject: &InjectNoise, emission: &mut EmissionSpec) -> Result<()> {
    emission.noise = Some(NoiseSpec {
        noise_ref: inject.reference.clone(),
        modifier_ref: inject.modifier_ref.clone(),
        model: inject.model.clone(),
        site: inject.site,
    });
    Ok(())
}

fn synth_of(mode: crate::annotations::DecompositionMode) -> Synth {
    match mode {
        crate::annotations::DecompositionMode::RzSx => Synth::RzSx,
        crate::annotations::DecompositionMode::RzRx => Synth::RzRx,
        crate::annotations::DecompositionMode::Corpse => Synth::Corpse,
    }
}

/// Splits the qubits of a gate-dependent twirl box into entangling qubits
/// (those in exactly one identical 2Q gate) and Pauli fallback qubits.
///
/// Duplicate 2Q gates on one pair, partially overlapping pairs, and mixed
/// 2Q gate types are rejected; a box with no 2Q gates silently demotes the
/// twirl group to Pauli.
fn classify_gate_dependent_twirl(
    box_op: &BoxOp,
    outer_qubits: &[usize],
    emission: &mut EmissionSpec,
) -> Result<()> {
    let mut seen_pairs = QubitPartition::new(2);
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    let mut gate_names: Vec<String> = Vec::new();

    for instruction in &box_op.body.instructions {
        if let Operation::Gate(gate) = &instruction.operation
            && gate.num_qubits() == 2
        {
            let low = outer_qubits[instruction.qubits[0]];
            let high = outer_qubits[instruction.qubits[1]];
            match seen_pairs.add(&[low, high]) {
                AddOutcome::Added => pairs.push((low, high)),
                AddOutcome::Duplicate => {
                    return Err(BuildError::DuplicateEntangler(low, high).into());
                }
                AddOutcome::PartialOverlap => {
                    // the reversed pair counts as a duplicate placement
                    if seen_pairs.contains_subsystem(&[high, low]) {
                        return Err(BuildError::DuplicateEntangler(low, high).into());
                    }
                    return Err(BuildError::OverlappingEntanglers.into());
                }
            }
            if !gate_names.contains(&gate.name().to_string()) {
                gate_names.push(gate.name().to_string());
            }
        }
    }

    if gate_names.is_empty() {
        emission.twirl_group = Some(GroupMode::Pauli);
        return Ok(());
    }
    if gate_names.len() > 1 {
        return Err(BuildError::MultipleEntanglerTypes(gate_names).into());
    }

    emission.twirl_gate = Some(gate_names.remove(0));
    emission.entangling_pairs = pairs;
    emission.fallback_qubits = emission
        .qubits
        .iter()
        .copied()
        .filter(|qubit| !seen_pairs.contains_element(*qubit))
        .collect();
    Ok(())
}
