use ndarray::Array2;

use crate::error::{Error, SamplexRuntimeError};
use crate::synths::Synth;
use virtual_registers::registers::{VirtualKind, VirtualRegister};

use super::{Footprint, OutputWrite, RegisterMap, lookup_register};

/// Converts a register into the kind the synthesizer expects, synthesizes
/// numeric angles, and writes them at the declared template parameter
/// indices of the `parameter_values` output.
#[derive(Debug, Clone)]
pub struct CollectTemplateValues {
    pub register: String,
    pub register_kind: VirtualKind,
    pub synth: Synth,
    /// Register rows to synthesize, in dressing order.
    pub subsystems: Vec<usize>,
    /// Shape `(subsystems.len(), synth.num_params())`.
    pub template_idxs: Array2<usize>,
}

impl CollectTemplateValues {
    pub fn reads_from(&self) -> Vec<Footprint> {
        vec![(
            self.register.clone(),
            self.subsystems.clone(),
            self.register_kind,
        )]
    }

    pub fn collect(&self, registers: &RegisterMap) -> Result<Vec<OutputWrite>, Error> {
        let register = lookup_register(registers, &self.register)?;
        let sliced = register.slice(&self.subsystems)?;
        let VirtualRegister::U2(unitaries) = sliced.convert_to(VirtualKind::U2)? else {
            return Err(
                SamplexRuntimeError::RegisterNotFound(self.register.clone()).into(),
            );
        };
        let values = self.synth.angles(&unitaries);
        Ok(vec![OutputWrite::TemplateValues {
            template_idxs: self.template_idxs.clone(),
            values,
        }])
    }
}

/// XORs a Z2 register into declared bit positions of a boolean output
/// array. Used for measurement-basis flips under Pauli twirling and for
/// surfacing noise-sample signs.
#[derive(Debug, Clone)]
pub struct CollectZ2ToOutputNode {
    pub register: String,
    pub subsystems: Vec<usize>,
    pub output: String,
    /// One column position per listed subsystem.
    pub positions: Vec<usize>,
}

impl CollectZ2ToOutputNode {
    pub fn reads_from(&self) -> Vec<Footprint> {
        vec![(
            self.register.clone(),
            self.subsystems.clone(),
            VirtualKind::Z2,
        )]
    }

    pub fn collect(&self, registers: &RegisterMap) -> Result<Vec<OutputWrite>, Error> {
        let register = lookup_register(registers, &self.register)?;
        let VirtualRegister::Z2(bits) = register.convert_to(VirtualKind::Z2)? else {
            return Err(
                SamplexRuntimeError::RegisterNotFound(self.register.clone()).into(),
            );
        };
        let selected = bits.slice(&self.subsystems)?;
        let values = Array2::from_shape_fn(
            (self.subsystems.len(), selected.num_randomizations()),
            |(row, column)| selected.bits()[(row, column)],
        );
        Ok(vec![OutputWrite::Flips {
            output: self.output.clone(),
            positions: self.positions.clone(),
            bits: values,
        }])
    }
}
