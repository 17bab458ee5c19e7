//! The samplex node catalog.
//!
//! Nodes come in three roles. *Sampling* nodes instantiate fresh registers
//! from randomness and inputs; *evaluation* nodes transform, combine, and
//! derive registers; *collection* nodes read registers and produce output
//! tensor writes. Every node declares its read and write footprints so the
//! executor can validate the graph and run footprint-disjoint nodes of one
//! topological generation in parallel.
//!
//! Execution is effect-based: a node never touches shared state directly.
//! It computes its register or output writes against an immutable snapshot,
//! and the executor applies the effects in node order at each phase barrier,
//! which keeps the output bit-identical for every worker count.

mod collect;
mod multiplication;
mod past_clifford;
mod sampling;
mod structural;

pub use collect::{CollectTemplateValues, CollectZ2ToOutputNode};
pub use multiplication::{
    ChangeBasisNode, MultiplicationNode, MultiplySide, U2ParametricMultiplicationNode, U2WordOp,
    WordAngle, word_matrix,
};
pub use past_clifford::{C1PastCliffordNode, PauliPastCliffordNode};
pub use sampling::{InjectNoiseNode, TwirlSamplingNode};
pub use structural::{CombineOperand, CombineRegistersNode, ConversionNode, CopyNode, SliceRegisterNode};

use std::collections::HashMap;

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;

use crate::error::{Error, SamplexConstructionError};
use crate::tensor::TensorInterface;
use virtual_registers::registers::{VirtualKind, VirtualRegister};

/// The registers alive during one `sample` call.
pub type RegisterMap = HashMap<String, VirtualRegister>;

/// The broad role of a node, fixing which phase it runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Sampling,
    Evaluation,
    Collection,
}

/// A register mutation produced by an evaluation node.
#[derive(Debug, Clone)]
pub enum RegisterWrite {
    /// Insert or fully overwrite a register.
    Replace {
        name: String,
        register: VirtualRegister,
    },
    /// Overwrite the listed subsystem rows.
    Assign {
        name: String,
        subsystems: Vec<usize>,
        values: VirtualRegister,
    },
}

/// An output mutation produced by a collection node.
#[derive(Debug, Clone)]
pub enum OutputWrite {
    /// Write synthesized angles into `parameter_values`:
    /// `output[r, template_idxs[s, p]] = values[s, r, p]`, broadcasting a
    /// single randomization column.
    TemplateValues {
        template_idxs: Array2<usize>,
        values: Array3<f64>,
    },
    /// XOR bit columns into a boolean output:
    /// `output[r, positions[i]] ^= bits[i, r]`.
    Flips {
        output: String,
        positions: Vec<usize>,
        bits: Array2<bool>,
    },
}

/// A `(register, subsystems, kind)` footprint entry.
pub type Footprint = (String, Vec<usize>, VirtualKind);

/// Any node of the samplex graph.
#[derive(Debug, Clone)]
pub enum Node {
    TwirlSampling(TwirlSamplingNode),
    InjectNoise(InjectNoiseNode),
    PauliPastClifford(PauliPastCliffordNode),
    C1PastClifford(C1PastCliffordNode),
    ChangeBasis(ChangeBasisNode),
    Copy(CopyNode),
    SliceRegister(SliceRegisterNode),
    CombineRegisters(CombineRegistersNode),
    Conversion(ConversionNode),
    Multiplication(MultiplicationNode),
    U2ParametricMultiplication(U2ParametricMultiplicationNode),
    CollectTemplateValues(CollectTemplateValues),
    CollectZ2ToOutput(CollectZ2ToOutputNode),
}

impl Node {
    pub fn role(&self) -> NodeRole {
        match self {
            Node::TwirlSampling(_) | Node::InjectNoise(_) => NodeRole::Sampling,
            Node::CollectTemplateValues(_) | Node::CollectZ2ToOutput(_) => NodeRole::Collection,
            _ => NodeRole::Evaluation,
        }
    }

    /// Registers this node creates, with their widths and kinds.
    pub fn instantiates(&self) -> Vec<(String, usize, VirtualKind)> {
        match self {
            Node::TwirlSampling(node) => node.instantiates(),
            Node::InjectNoise(node) => node.instantiates(),
            Node::Copy(node) => node.instantiates(),
            Node::SliceRegister(node) => node.instantiates(),
            Node::CombineRegisters(node) => node.instantiates(),
            Node::Conversion(node) => node.instantiates(),
            _ => vec![],
        }
    }

    /// Registers this node reads, with the subsystems touched and the kind
    /// it expects to find (or convert from).
    pub fn reads_from(&self) -> Vec<Footprint> {
        match self {
            Node::TwirlSampling(_) | Node::InjectNoise(_) => vec![],
            Node::PauliPastClifford(node) => node.footprint(),
            Node::C1PastClifford(node) => node.footprint(),
            Node::ChangeBasis(node) => node.footprint(),
            Node::Copy(node) => node.reads_from(),
            Node::SliceRegister(node) => node.reads_from(),
            Node::CombineRegisters(node) => node.reads_from(),
            Node::Conversion(node) => node.reads_from(),
            Node::Multiplication(node) => node.footprint(),
            Node::U2ParametricMultiplication(node) => node.footprint(),
            Node::CollectTemplateValues(node) => node.reads_from(),
            Node::CollectZ2ToOutput(node) => node.reads_from(),
        }
    }

    /// Registers this node mutates in place.
    pub fn writes_to(&self) -> Vec<Footprint> {
        match self {
            Node::PauliPastClifford(node) => node.footprint(),
            Node::C1PastClifford(node) => node.footprint(),
            Node::ChangeBasis(node) => node.footprint(),
            Node::Multiplication(node) => node.footprint(),
            Node::U2ParametricMultiplication(node) => node.footprint(),
            _ => vec![],
        }
    }

    /// Parameter-expression-table indices referenced by this node.
    pub fn parameter_indices(&self) -> Vec<usize> {
        match self {
            Node::U2ParametricMultiplication(node) => node.parameter_indices(),
            _ => vec![],
        }
    }

    /// Checks this node against the registers declared by its ancestors,
    /// then records its own instantiations.
    pub fn validate_and_update(
        &self,
        descriptions: &mut HashMap<String, (usize, VirtualKind)>,
    ) -> Result<(), SamplexConstructionError> {
        for (name, subsystems, expected) in self.reads_from() {
            let (num_subsystems, found) = descriptions
                .get(&name)
                .ok_or_else(|| SamplexConstructionError::MissingRegister(name.clone()))?;
            if !found.convertible_to(expected) && !expected.convertible_to(*found) {
                return Err(SamplexConstructionError::RegisterKindMismatch {
                    name,
                    expected,
                    found: *found,
                });
            }
            if let Some(&subsystem) = subsystems.iter().find(|&&idx| idx >= *num_subsystems) {
                return Err(SamplexConstructionError::SubsystemOutOfRange {
                    name,
                    subsystem,
                    num_subsystems: *num_subsystems,
                });
            }
        }
        for (name, num_subsystems, kind) in self.instantiates() {
            if descriptions
                .insert(name.clone(), (num_subsystems, kind))
                .is_some()
            {
                return Err(SamplexConstructionError::DuplicateRegister(name));
            }
        }
        Ok(())
    }

    /// Runs a sampling node, producing fresh registers.
    pub fn sample(
        &self,
        rng: &mut StdRng,
        inputs: &TensorInterface,
        num_randomizations: usize,
    ) -> Result<Vec<(String, VirtualRegister)>, Error> {
        match self {
            Node::TwirlSampling(node) => node.sample(rng, num_randomizations),
            Node::InjectNoise(node) => node.sample(rng, inputs, num_randomizations),
            _ => Ok(vec![]),
        }
    }

    /// Runs an evaluation node against an immutable register snapshot.
    pub fn evaluate(
        &self,
        registers: &RegisterMap,
        inputs: &TensorInterface,
        params: &[f64],
    ) -> Result<Vec<RegisterWrite>, Error> {
        match self {
            Node::PauliPastClifford(node) => node.evaluate(registers),
            Node::C1PastClifford(node) => node.evaluate(registers),
            Node::ChangeBasis(node) => node.evaluate(registers, inputs),
            Node::Copy(node) => node.evaluate(registers),
            Node::SliceRegister(node) => node.evaluate(registers),
            Node::CombineRegisters(node) => node.evaluate(registers),
            Node::Conversion(node) => node.evaluate(registers),
            Node::Multiplication(node) => node.evaluate(registers),
            Node::U2ParametricMultiplication(node) => node.evaluate(registers, params),
            _ => Ok(vec![]),
        }
    }

    /// Runs a collection node, producing output writes.
    pub fn collect(
        &self,
        registers: &RegisterMap,
        _rng: &mut StdRng,
    ) -> Result<Vec<OutputWrite>, Error> {
        match self {
            Node::CollectTemplateValues(node) => node.collect(registers),
            Node::CollectZ2ToOutput(node) => node.collect(registers),
            _ => Ok(vec![]),
        }
    }

    /// The stable serialization type id of this node kind.
    pub fn type_id(&self) -> &'static str {
        match self {
            Node::ChangeBasis(_) => "change_basis",
            Node::CollectTemplateValues(_) => "collect_template_values",
            Node::CollectZ2ToOutput(_) => "collect_z2_to_output",
            Node::CombineRegisters(_) => "combine_registers",
            Node::Conversion(_) => "conversion",
            Node::InjectNoise(_) => "inject_noise",
            Node::Multiplication(node) => match node.side {
                MultiplySide::Left => "left_multiplication",
                MultiplySide::Right => "right_multiplication",
            },
            Node::PauliPastClifford(_) => "pauli_past_clifford",
            Node::C1PastClifford(_) => "c1_past_clifford",
            Node::SliceRegister(_) => "slice_register",
            Node::TwirlSampling(_) => "twirl_sampling",
            Node::U2ParametricMultiplication(node) => match node.side {
                MultiplySide::Left => "left_u2_parametric_multiplication",
                MultiplySide::Right => "right_u2_parametric_multiplication",
            },
            Node::Copy(_) => "copy",
        }
    }
}

pub(crate) fn lookup_register<'a>(
    registers: &'a RegisterMap,
    name: &str,
) -> Result<&'a VirtualRegister, Error> {
    registers
        .get(name)
        .ok_or_else(|| crate::error::SamplexRuntimeError::RegisterNotFound(name.to_string()).into())
}
