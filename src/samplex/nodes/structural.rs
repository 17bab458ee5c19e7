use crate::error::Error;
use virtual_registers::registers::{VirtualKind, VirtualRegister};

use super::{Footprint, RegisterMap, RegisterWrite, lookup_register};

/// Copies a register under a new name.
#[derive(Debug, Clone)]
pub struct CopyNode {
    pub register: String,
    pub output: String,
    pub kind: VirtualKind,
    pub num_subsystems: usize,
}

impl CopyNode {
    pub fn instantiates(&self) -> Vec<(String, usize, VirtualKind)> {
        vec![(self.output.clone(), self.num_subsystems, self.kind)]
    }

    pub fn reads_from(&self) -> Vec<Footprint> {
        vec![(
            self.register.clone(),
            (0..self.num_subsystems).collect(),
            self.kind,
        )]
    }

    pub fn evaluate(&self, registers: &RegisterMap) -> Result<Vec<RegisterWrite>, Error> {
        let register = lookup_register(registers, &self.register)?;
        Ok(vec![RegisterWrite::Replace {
            name: self.output.clone(),
            register: register.clone(),
        }])
    }
}

/// Selects a subsystem subset of a register, converting the kind on the way
/// when the output kind differs.
#[derive(Debug, Clone)]
pub struct SliceRegisterNode {
    pub input: String,
    pub output: String,
    pub input_kind: VirtualKind,
    pub output_kind: VirtualKind,
    pub slice_idxs: Vec<usize>,
}

impl SliceRegisterNode {
    pub fn instantiates(&self) -> Vec<(String, usize, VirtualKind)> {
        vec![(self.output.clone(), self.slice_idxs.len(), self.output_kind)]
    }

    pub fn reads_from(&self) -> Vec<Footprint> {
        vec![(self.input.clone(), self.slice_idxs.clone(), self.input_kind)]
    }

    pub fn evaluate(&self, registers: &RegisterMap) -> Result<Vec<RegisterWrite>, Error> {
        let register = lookup_register(registers, &self.input)?;
        let converted = register.convert_to(self.output_kind)?;
        let sliced = converted.slice(&self.slice_idxs)?;
        Ok(vec![RegisterWrite::Replace {
            name: self.output.clone(),
            register: sliced,
        }])
    }
}

/// One operand of a [`CombineRegistersNode`]: a register together with a
/// map from its subsystem rows to output rows.
#[derive(Debug, Clone)]
pub struct CombineOperand {
    pub register: String,
    pub kind: VirtualKind,
    /// `(source subsystem, output subsystem)` pairs.
    pub mapping: Vec<(usize, usize)>,
}

/// Composes several registers into one output register.
///
/// The output starts as the identity; each operand in order is converted to
/// the output kind and right-multiplied into the output rows its mapping
/// names. Operands with disjoint output rows therefore interleave, and
/// operands sharing rows compose in operand order. Output rows no operand
/// covers stay at the identity.
#[derive(Debug, Clone)]
pub struct CombineRegistersNode {
    pub output: String,
    pub output_kind: VirtualKind,
    pub num_subsystems: usize,
    pub operands: Vec<CombineOperand>,
}

impl CombineRegistersNode {
    pub fn instantiates(&self) -> Vec<(String, usize, VirtualKind)> {
        vec![(self.output.clone(), self.num_subsystems, self.output_kind)]
    }

    pub fn reads_from(&self) -> Vec<Footprint> {
        self.operands
            .iter()
            .map(|operand| {
                (
                    operand.register.clone(),
                    operand.mapping.iter().map(|&(src, _)| src).collect(),
                    operand.kind,
                )
            })
            .collect()
    }

    pub fn evaluate(&self, registers: &RegisterMap) -> Result<Vec<RegisterWrite>, Error> {
        let num_randomizations = self
            .operands
            .iter()
            .map(|operand| {
                lookup_register(registers, &operand.register)
                    .map(VirtualRegister::num_randomizations)
            })
            .try_fold(1usize, |max, count| count.map(|c| max.max(c)))?;

        let mut output = VirtualRegister::identity(
            self.output_kind,
            self.num_subsystems,
            num_randomizations,
        );
        for operand in &self.operands {
            let register = lookup_register(registers, &operand.register)?;
            let converted = register.convert_to(self.output_kind)?;
            let sources: Vec<usize> = operand.mapping.iter().map(|&(src, _)| src).collect();
            let destinations: Vec<usize> =
                operand.mapping.iter().map(|&(_, dst)| dst).collect();
            let selected = converted.slice(&sources)?;
            output.inplace_multiply(&selected, Some(&destinations))?;
        }
        Ok(vec![RegisterWrite::Replace {
            name: self.output.clone(),
            register: output,
        }])
    }
}

/// Converts a register to another kind under a new name.
#[derive(Debug, Clone)]
pub struct ConversionNode {
    pub input: String,
    pub input_kind: VirtualKind,
    pub output: String,
    pub output_kind: VirtualKind,
    pub num_subsystems: usize,
}

impl ConversionNode {
    pub fn instantiates(&self) -> Vec<(String, usize, VirtualKind)> {
        vec![(self.output.clone(), self.num_subsystems, self.output_kind)]
    }

    pub fn reads_from(&self) -> Vec<Footprint> {
        vec![(
            self.input.clone(),
            (0..self.num_subsystems).collect(),
            self.input_kind,
        )]
    }

    pub fn evaluate(&self, registers: &RegisterMap) -> Result<Vec<RegisterWrite>, Error> {
        let register = lookup_register(registers, &self.input)?;
        Ok(vec![RegisterWrite::Replace {
            name: self.output.clone(),
            register: register.convert_to(self.output_kind)?,
        }])
    }
}
