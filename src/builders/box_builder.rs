use ndarray::Array2;

use crate::annotations::{BasisChangeMode, GroupMode, NoiseSite};
use crate::circuit::{Angle, BoxOp, Circuit, Gate, Instruction, Operation};
use crate::error::{BuildError, Result, SamplexBuildError};
use crate::params::{ParamIter, ParameterExpressionTable};
use crate::pre_samplex::{CollectHandle, PreSamplex, PropagateOp};
use crate::samplex::nodes::{MultiplySide, U2WordOp, WordAngle};
use crate::synths::Synth;
use virtual_registers::distributions::{
    BalancedUniformPauli, Distribution, UniformLocalC1, UniformPauli,
};
use virtual_registers::tables::is_two_qubit_gate;

use super::dynamic_builder;
use super::specs::{CollectionSpec, EmissionSpec};
use super::template_state::TemplateState;

/// The boolean-output name measurement flips are collected under.
pub const MEASUREMENT_FLIPS: &str = "measurement_flips.meas";

/// Converts an absorbed single-qubit gate into a word op, registering any
/// symbolic angle in the parameter expression table.
pub(crate) fn gate_word(
    gate: &Gate,
    table: &mut ParameterExpressionTable,
) -> Result<U2WordOp> {
    match gate {
        Gate::Rz(Angle::Expr(expr)) => Ok(U2WordOp::Rz(WordAngle::Param(table.append(expr.clone())))),
        Gate::Rx(Angle::Expr(expr)) => Ok(U2WordOp::Rx(WordAngle::Param(table.append(expr.clone())))),
        Gate::Rz(Angle::Index(_)) | Gate::Rx(Angle::Index(_)) => Err(
            SamplexBuildError::UnsupportedBoxInstruction("indexed rotation".into()).into(),
        ),
        fixed if fixed.num_qubits() == 1 => Ok(U2WordOp::Gate(fixed.name().to_string())),
        other => Err(SamplexBuildError::UnsupportedBoxInstruction(other.name().into()).into()),
    }
}

/// Appends one dressed layer to a circuit, returning the template parameter
/// indices as a `(rows, num_params)` grid.
pub(crate) fn append_dressed_layer(
    circuit: &mut Circuit,
    row_qubits: &[usize],
    synth: Synth,
    params: &mut ParamIter,
) -> Array2<usize> {
    let num_params = synth.num_params();
    let mut idxs = Array2::zeros((row_qubits.len(), num_params));
    for (row, &qubit) in row_qubits.iter().enumerate() {
        let start = params.peek();
        for instruction in synth.make_template(qubit, params) {
            circuit.instructions.push(instruction);
        }
        for param in 0..num_params {
            idxs[(row, param)] = start + param;
        }
    }
    idxs
}

/// Builds one annotated dressed box.
pub struct BoxBuilder<'a> {
    pub template: &'a mut TemplateState,
    pub pre: &'a mut PreSamplex,
    pub collection: CollectionSpec,
    pub emission: EmissionSpec,
}

impl<'a> BoxBuilder<'a> {
    pub fn new(
        template: &'a mut TemplateState,
        pre: &'a mut PreSamplex,
        collection: CollectionSpec,
        emission: EmissionSpec,
    ) -> Self {
        Self {
            template,
            pre,
            collection,
            emission,
        }
    }

    fn synth(&self) -> Synth {
        self.collection.synth.unwrap_or(Synth::RzSx)
    }

    fn remap(&self, outer_qubits: &[usize], instruction: &Instruction) -> Instruction {
        Instruction {
            operation: instruction.operation.clone(),
            qubits: instruction
                .qubits
                .iter()
                .map(|&body_qubit| outer_qubits[body_qubit])
                .collect(),
            clbits: instruction.clbits.clone(),
        }
    }

    /// Builds a left-dressed box: the dressing is prepended and random draws
    /// flow rightward out of the box.
    pub fn run_left(mut self, box_op: &BoxOp, outer_qubits: &[usize]) -> Result<()> {
        let rows = self.collection.qubits.clone();
        let synth = self.synth();

        self.template.next_scope();
        self.template.append_barrier('L');
        let param_idxs = append_dressed_layer(
            &mut self.template.template,
            &rows,
            synth,
            &mut self.template.param_iter,
        );
        self.template.append_barrier('M');
        let handle = self.pre.add_collect(&rows, synth, param_idxs);

        let mut measured: Vec<(usize, usize)> = Vec::new();
        let mut entangled: Vec<usize> = Vec::new();
        let mut mults: Vec<(U2WordOp, usize)> = Vec::new();
        let mut entangler_nodes = Vec::new();

        for instruction in &box_op.body.instructions {
            let remapped = self.remap(outer_qubits, instruction);
            // barriers may follow measurements; gates and conditionals may not
            let exempt = matches!(
                remapped.operation,
                Operation::Barrier(_) | Operation::Measure
            );
            if !exempt
                && measured
                    .iter()
                    .any(|&(qubit, _)| remapped.qubits.contains(&qubit))
            {
                return Err(SamplexBuildError::OperationAfterMeasurement.into());
            }
            match &remapped.operation {
                Operation::Barrier(_) => self.template.append(remapped),
                Operation::Measure => {
                    let qubit = remapped.qubits[0];
                    if measured.iter().any(|&(measured_qubit, _)| measured_qubit == qubit) {
                        return Err(SamplexBuildError::DoubleMeasurement.into());
                    }
                    measured.push((qubit, remapped.clbits[0]));
                    self.template.append(remapped);
                }
                Operation::Gate(gate) if gate.num_qubits() == 1 => {
                    let qubit = remapped.qubits[0];
                    if entangled.contains(&qubit) {
                        return Err(SamplexBuildError::SingleQubitAfterEntangler.into());
                    }
                    let word = gate_word(gate, &mut self.pre.param_table)?;
                    mults.push((word, qubit));
                }
                Operation::Gate(gate) => {
                    let name = gate.name();
                    if !gate.is_clifford() || !is_two_qubit_gate(name) {
                        return Err(SamplexBuildError::UnsupportedEntangler(name.into()).into());
                    }
                    entangled.extend(remapped.qubits.iter().copied());
                    let pair = (remapped.qubits[0], remapped.qubits[1]);
                    self.template.append(remapped);
                    entangler_nodes.push(self.pre.add_propagate(PropagateOp::Entangler {
                        gate: name.to_string(),
                        qubits: pair,
                    })?);
                }
                Operation::IfElse(if_else) => {
                    dynamic_builder::build_left_if_else(
                        self.template,
                        self.pre,
                        synth,
                        if_else,
                        &remapped.qubits,
                        &remapped.clbits,
                    )?;
                }
                Operation::Box(_) => {
                    return Err(
                        SamplexBuildError::UnsupportedBoxInstruction("box".into()).into()
                    );
                }
            }
        }

        // emissions at the right edge: noise, then basis, then twirl
        if let Some(noise) = self.emission.noise.clone() {
            if noise.site == Some(NoiseSite::Left) {
                return Err(BuildError::NoiseSiteMismatch {
                    site: "left".into(),
                    dressing: "left".into(),
                }
                .into());
            }
            let noise_rows: Vec<usize> = outer_qubits.to_vec();
            self.pre.add_emit_noise(
                noise_rows,
                noise.noise_ref,
                noise.modifier_ref,
                noise.model,
                true,
            );
        }

        // absorbed gates join the dressing innermost, in reverse circuit
        // order; a measurement basis change sits outermost
        for (word, qubit) in mults.into_iter().rev() {
            self.pre
                .append_dress_word(handle, vec![word], vec![qubit], MultiplySide::Right);
        }
        if let Some(basis) = self.emission.basis.clone() {
            if basis.mode != BasisChangeMode::Meas {
                return Err(BuildError::ConflictingDressings.into());
            }
            self.pre.append_dress_basis(
                handle,
                basis.input_name,
                basis.source_kind,
                MultiplySide::Left,
            );
        }

        self.emit_twirl_left(handle, &rows, &measured, &entangler_nodes)?;
        self.template.append_barrier('R');
        Ok(())
    }

    fn emit_twirl_left(
        &mut self,
        handle: CollectHandle,
        rows: &[usize],
        measured: &[(usize, usize)],
        entangler_nodes: &[petgraph::stable_graph::NodeIndex],
    ) -> Result<()> {
        let Some(group) = self.emission.twirl_group else {
            return Ok(());
        };
        match group {
            GroupMode::Pauli | GroupMode::BalancedPauli => {
                let distribution: Distribution = match group {
                    GroupMode::Pauli => UniformPauli::new(rows.len()).into(),
                    _ => BalancedUniformPauli::new(rows.len()).into(),
                };
                self.pre.add_emit_twirl(
                    rows.to_vec(),
                    distribution,
                    true,
                    Some(handle),
                    entangler_nodes,
                    measured,
                    Some(MEASUREMENT_FLIPS),
                );
            }
            GroupMode::LocalC1 => {
                if !measured.is_empty() {
                    return Err(SamplexBuildError::MeasurementWithNonPauliTwirl(
                        group.name().to_string(),
                    )
                    .into());
                }
                let gate = self
                    .emission
                    .twirl_gate
                    .clone()
                    .expect("classification sets the gate for local C1 twirls");
                let pair_rows: Vec<usize> = self
                    .emission
                    .entangling_pairs
                    .iter()
                    .flat_map(|&(low, high)| [low, high])
                    .collect();
                let distribution = UniformLocalC1::new(pair_rows.len(), &gate)?;
                self.pre.add_emit_twirl(
                    pair_rows,
                    distribution.into(),
                    true,
                    Some(handle),
                    entangler_nodes,
                    &[],
                    None,
                );
                if !self.emission.fallback_qubits.is_empty() {
                    let fallback = self.emission.fallback_qubits.clone();
                    self.pre.add_emit_twirl(
                        fallback.clone(),
                        UniformPauli::new(fallback.len()).into(),
                        true,
                        Some(handle),
                        entangler_nodes,
                        &[],
                        None,
                    );
                }
            }
        }
        Ok(())
    }

    /// Builds a right-dressed box: the dressing is appended and random draws
    /// flow leftward into the preceding boxes.
    pub fn run_right(mut self, box_op: &BoxOp, outer_qubits: &[usize]) -> Result<()> {
        let rows = self.collection.qubits.clone();
        let synth = self.synth();

        self.template.next_scope();
        self.template.append_barrier('L');

        // emissions at the left edge: basis is deferred to the dress chain;
        // noise and twirl inverses travel leftward immediately
        if let Some(noise) = self.emission.noise.clone() {
            if noise.site == Some(NoiseSite::Right) {
                return Err(BuildError::NoiseSiteMismatch {
                    site: "right".into(),
                    dressing: "right".into(),
                }
                .into());
            }
            self.pre.add_emit_noise(
                outer_qubits.to_vec(),
                noise.noise_ref,
                noise.modifier_ref,
                noise.model,
                false,
            );
        }
        self.emit_twirl_right(&rows)?;

        let mut single_qubit_seen: Vec<usize> = Vec::new();
        let mut mults: Vec<(U2WordOp, usize)> = Vec::new();

        for instruction in &box_op.body.instructions {
            let remapped = self.remap(outer_qubits, instruction);
            match &remapped.operation {
                Operation::Barrier(_) => self.template.append(remapped),
                Operation::Measure => {
                    return Err(SamplexBuildError::MeasurementInRightDressedBox.into());
                }
                Operation::Gate(gate) if gate.num_qubits() == 1 => {
                    let qubit = remapped.qubits[0];
                    single_qubit_seen.push(qubit);
                    let word = gate_word(gate, &mut self.pre.param_table)?;
                    mults.push((word, qubit));
                }
                Operation::Gate(gate) => {
                    let name = gate.name();
                    if !gate.is_clifford() || !is_two_qubit_gate(name) {
                        return Err(SamplexBuildError::UnsupportedEntangler(name.into()).into());
                    }
                    if remapped
                        .qubits
                        .iter()
                        .any(|qubit| single_qubit_seen.contains(qubit))
                    {
                        return Err(SamplexBuildError::SingleQubitBeforeEntangler.into());
                    }
                    let pair = (remapped.qubits[0], remapped.qubits[1]);
                    self.template.append(remapped);
                    self.pre.add_propagate(PropagateOp::Entangler {
                        gate: name.to_string(),
                        qubits: pair,
                    })?;
                }
                Operation::IfElse(if_else) => {
                    dynamic_builder::build_right_if_else(
                        self.template,
                        self.pre,
                        synth,
                        if_else,
                        &remapped.qubits,
                        &remapped.clbits,
                    )?;
                }
                Operation::Box(_) => {
                    return Err(
                        SamplexBuildError::UnsupportedBoxInstruction("box".into()).into()
                    );
                }
            }
        }

        self.template.append_barrier('M');
        let param_idxs = append_dressed_layer(
            &mut self.template.template,
            &rows,
            synth,
            &mut self.template.param_iter,
        );
        let handle = self.pre.add_collect(&rows, synth, param_idxs);

        // absorbed gates join the dressing in forward circuit order; a
        // preparation basis change sits innermost
        if let Some(basis) = self.emission.basis.clone() {
            if basis.mode != BasisChangeMode::Prep {
                return Err(BuildError::ConflictingDressings.into());
            }
            self.pre.append_dress_basis(
                handle,
                basis.input_name,
                basis.source_kind,
                MultiplySide::Right,
            );
        }
        for (word, qubit) in mults {
            self.pre
                .append_dress_word(handle, vec![word], vec![qubit], MultiplySide::Left);
        }

        self.template.append_barrier('R');
        Ok(())
    }

    fn emit_twirl_right(&mut self, rows: &[usize]) -> Result<()> {
        let Some(group) = self.emission.twirl_group else {
            return Ok(());
        };
        let coverage = self.pre.rightward_coverage(rows);
        let uncovered: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|qubit| !coverage.contains(qubit))
            .collect();
        if uncovered.is_empty() {
            return Ok(());
        }
        match group {
            GroupMode::Pauli | GroupMode::BalancedPauli => {
                let distribution: Distribution = match group {
                    GroupMode::Pauli => UniformPauli::new(uncovered.len()).into(),
                    _ => BalancedUniformPauli::new(uncovered.len()).into(),
                };
                self.pre
                    .add_emit_twirl(uncovered, distribution, false, None, &[], &[], None);
            }
            GroupMode::LocalC1 => {
                let gate = self
                    .emission
                    .twirl_gate
                    .clone()
                    .expect("classification sets the gate for local C1 twirls");
                let pair_rows: Vec<usize> = self
                    .emission
                    .entangling_pairs
                    .iter()
                    .filter(|(low, high)| uncovered.contains(low) && uncovered.contains(high))
                    .flat_map(|&(low, high)| [low, high])
                    .collect();
                if !pair_rows.is_empty() {
                    let distribution = UniformLocalC1::new(pair_rows.len(), &gate)?;
                    self.pre.add_emit_twirl(
                        pair_rows.clone(),
                        distribution.into(),
                        false,
                        None,
                        &[],
                        &[],
                        None,
                    );
                }
                let fallback: Vec<usize> = uncovered
                    .iter()
                    .copied()
                    .filter(|qubit| !pair_rows.contains(qubit))
                    .collect();
                if !fallback.is_empty() {
                    self.pre.add_emit_twirl(
                        fallback.clone(),
                        UniformPauli::new(fallback.len()).into(),
                        false,
                        None,
                        &[],
                        &[],
                        None,
                    );
                }
            }
        }
        Ok(())
    }
}
