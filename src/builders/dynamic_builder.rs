//! Builders for dressed conditional operations.
//!
//! An `if_else` inside a dressed box gets a dressed layer in each branch.
//! Both branches are built against a snapshot of the dangler state so they
//! see identical surroundings; the open endpoints of each branch are wrapped
//! in copy nodes and re-registered, so that a register arriving later feeds
//! both branch dressings independently (only one branch runs on hardware,
//! and whichever it is holds the correct correction).

use crate::circuit::{Circuit, IfElseOp, Instruction, Operation};
use crate::error::{Result, SamplexBuildError};
use crate::pre_samplex::{
    DanglerMatch, DanglerRole, Direction, PreNodeKind, PreSamplex, PropagateOp,
};
use crate::samplex::nodes::{MultiplySide, U2WordOp};
use crate::synths::Synth;
use virtual_registers::tables::is_two_qubit_gate;

use super::box_builder::{append_dressed_layer, gate_word};
use super::template_state::TemplateState;

fn left_acceptor_match() -> DanglerMatch {
    DanglerMatch {
        direction: Direction::Left,
        role: DanglerRole::Acceptor,
        head_kinds: vec![PreNodeKind::Combine, PreNodeKind::Propagate, PreNodeKind::Copy],
    }
}

fn right_producer_match() -> DanglerMatch {
    DanglerMatch {
        direction: Direction::Right,
        role: DanglerRole::Producer,
        head_kinds: vec![
            PreNodeKind::Sample,
            PreNodeKind::Propagate,
            PreNodeKind::Emit,
            PreNodeKind::Copy,
        ],
    }
}

/// Remaps a branch-body instruction into block-local and outer coordinates.
fn split_instruction(
    instruction: &Instruction,
    outer_qubits: &[usize],
) -> (Instruction, Vec<usize>) {
    let outer: Vec<usize> = instruction
        .qubits
        .iter()
        .map(|&body_qubit| outer_qubits[body_qubit])
        .collect();
    (instruction.clone(), outer)
}

/// Builds one branch of a left-dressed conditional: a dressed layer is
/// prepended to the block, entanglers extend the branch's collect chain,
/// and the open chain heads are wrapped in copies for later arrivals.
fn build_left_branch(
    template: &mut TemplateState,
    pre: &mut PreSamplex,
    synth: Synth,
    body: Option<&Circuit>,
    outer_qubits: &[usize],
    num_clbits: usize,
) -> Result<(Circuit, Vec<(usize, Vec<usize>)>)> {
    // the enclosing box's open acceptors stop at this conditional
    let _ = pre.find_then_remove_danglers(&left_acceptor_match(), outer_qubits);

    let mut block = Circuit::new(outer_qubits.len(), num_clbits);
    let local_rows: Vec<usize> = (0..outer_qubits.len()).collect();
    let param_idxs =
        append_dressed_layer(&mut block, &local_rows, synth, &mut template.param_iter);
    let handle = pre.add_collect(outer_qubits, synth, param_idxs);

    let mut entangled: Vec<usize> = Vec::new();
    let mut mults: Vec<(U2WordOp, usize)> = Vec::new();
    if let Some(body) = body {
        for instruction in &body.instructions {
            let (local, outer) = split_instruction(instruction, outer_qubits);
            match &local.operation {
                Operation::Barrier(_) => block.instructions.push(local),
                Operation::Gate(gate) if gate.num_qubits() == 1 => {
                    if entangled.contains(&outer[0]) {
                        return Err(SamplexBuildError::SingleQubitAfterEntangler.into());
                    }
                    mults.push((gate_word(gate, &mut pre.param_table)?, outer[0]));
                }
                Operation::Gate(gate) => {
                    let name = gate.name();
                    if !gate.is_clifford() || !is_two_qubit_gate(name) {
                        return Err(SamplexBuildError::UnsupportedEntangler(name.into()).into());
                    }
                    entangled.extend(outer.iter().copied());
                    block.instructions.push(local);
                    pre.add_propagate(PropagateOp::Entangler {
                        gate: name.to_string(),
                        qubits: (outer[0], outer[1]),
                    })?;
                }
                other => {
                    return Err(SamplexBuildError::UnsupportedBoxInstruction(
                        other.name().to_string(),
                    )
                    .into());
                }
            }
        }
    }

    for (word, qubit) in mults.into_iter().rev() {
        pre.append_dress_word(handle, vec![word], vec![qubit], MultiplySide::Right);
    }

    let copies = pre.wrap_danglers_in_copies(&left_acceptor_match(), outer_qubits);
    Ok((block, copies))
}

/// Builds a dressed conditional inside a left-dressed box.
pub fn build_left_if_else(
    template: &mut TemplateState,
    pre: &mut PreSamplex,
    synth: Synth,
    if_else: &IfElseOp,
    outer_qubits: &[usize],
    clbits: &[usize],
) -> Result<()> {
    let num_clbits = if_else.then_body.num_clbits;
    let snapshot = pre.snapshot_danglers();

    let (then_block, then_copies) = build_left_branch(
        template,
        pre,
        synth,
        Some(&if_else.then_body),
        outer_qubits,
        num_clbits,
    )?;
    pre.restore_danglers(&snapshot);
    let (else_block, else_copies) = build_left_branch(
        template,
        pre,
        synth,
        if_else.else_body.as_ref(),
        outer_qubits,
        num_clbits,
    )?;

    for (chain, qubits) in then_copies.iter().chain(&else_copies) {
        pre.re_register(*chain, qubits);
    }

    template.append(Instruction {
        operation: Operation::IfElse(IfElseOp {
            condition: if_else.condition,
            then_body: then_block,
            else_body: Some(else_block),
        }),
        qubits: outer_qubits.to_vec(),
        clbits: clbits.to_vec(),
    });
    Ok(())
}

/// Builds one branch of a right-dressed conditional: arriving rightward
/// registers are copied into the branch, cross its entanglers, and are
/// collected by a dressed layer appended at the block's end.
fn build_right_branch(
    template: &mut TemplateState,
    pre: &mut PreSamplex,
    synth: Synth,
    body: Option<&Circuit>,
    outer_qubits: &[usize],
    num_clbits: usize,
) -> Result<(Circuit, Option<usize>)> {
    let copies = pre.wrap_danglers_in_copies(&right_producer_match(), outer_qubits);
    for (chain, qubits) in &copies {
        pre.re_register(*chain, qubits);
    }

    let mut block = Circuit::new(outer_qubits.len(), num_clbits);
    let mut single_qubit_seen: Vec<usize> = Vec::new();
    let mut mults: Vec<(U2WordOp, usize)> = Vec::new();
    if let Some(body) = body {
        for instruction in &body.instructions {
            let (local, outer) = split_instruction(instruction, outer_qubits);
            match &local.operation {
                Operation::Barrier(_) => block.instructions.push(local),
                Operation::Gate(gate) if gate.num_qubits() == 1 => {
                    single_qubit_seen.push(outer[0]);
                    mults.push((gate_word(gate, &mut pre.param_table)?, outer[0]));
                }
                Operation::Gate(gate) => {
                    let name = gate.name();
                    if !gate.is_clifford() || !is_two_qubit_gate(name) {
                        return Err(SamplexBuildError::UnsupportedEntangler(name.into()).into());
                    }
                    if outer.iter().any(|qubit| single_qubit_seen.contains(qubit)) {
                        return Err(SamplexBuildError::SingleQubitBeforeEntangler.into());
                    }
                    block.instructions.push(local);
                    pre.add_propagate(PropagateOp::Entangler {
                        gate: name.to_string(),
                        qubits: (outer[0], outer[1]),
                    })?;
                }
                other => {
                    return Err(SamplexBuildError::UnsupportedBoxInstruction(
                        other.name().to_string(),
                    )
                    .into());
                }
            }
        }
    }

    let local_rows: Vec<usize> = (0..outer_qubits.len()).collect();
    let param_idxs =
        append_dressed_layer(&mut block, &local_rows, synth, &mut template.param_iter);
    let handle = pre.add_collect(outer_qubits, synth, param_idxs);
    for (word, qubit) in mults {
        pre.append_dress_word(handle, vec![word], vec![qubit], MultiplySide::Left);
    }

    Ok((block, pre.acceptor_chain_of(handle)))
}

/// Builds a dressed conditional inside a right-dressed box.
pub fn build_right_if_else(
    template: &mut TemplateState,
    pre: &mut PreSamplex,
    synth: Synth,
    if_else: &IfElseOp,
    outer_qubits: &[usize],
    clbits: &[usize],
) -> Result<()> {
    let num_clbits = if_else.then_body.num_clbits;
    let snapshot = pre.snapshot_danglers();

    let (then_block, then_chain) = build_right_branch(
        template,
        pre,
        synth,
        Some(&if_else.then_body),
        outer_qubits,
        num_clbits,
    )?;
    pre.restore_danglers(&snapshot);
    let (else_block, _else_chain) = build_right_branch(
        template,
        pre,
        synth,
        if_else.else_body.as_ref(),
        outer_qubits,
        num_clbits,
    )?;

    // The restore dropped the then-branch's open dressing; bring it back so
    // later leftward arrivals reach both branches.
    if let Some(chain) = then_chain {
        pre.re_register(chain, outer_qubits);
    }

    template.append(Instruction {
        operation: Operation::IfElse(IfElseOp {
            condition: if_else.condition,
            then_body: then_block,
            else_body: Some(else_block),
        }),
        qubits: outer_qubits.to_vec(),
        clbits: clbits.to_vec(),
    });
    Ok(())
}
