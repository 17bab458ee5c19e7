use num_complex::Complex64;
use num_traits::{One, Zero};

use crate::error::{Error, SamplexRuntimeError};
use crate::tensor::TensorInterface;
use virtual_registers::registers::{
    C1Register, PauliRegister, U2Register, VirtualKind, VirtualRegister,
};
use virtual_registers::tableau::one_qubit_gate;
use virtual_registers::tables::{C1_CATALOG, Mat2};

use super::{Footprint, RegisterMap, RegisterWrite, lookup_register};

/// Which side an operand multiplies a register on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplySide {
    Left,
    Right,
}

fn apply_sided(
    register: &VirtualRegister,
    operand: &VirtualRegister,
    subsystems: Option<&[usize]>,
    side: MultiplySide,
) -> Result<VirtualRegister, Error> {
    Ok(match side {
        MultiplySide::Left => register.left_multiply(operand, subsystems)?,
        MultiplySide::Right => register.multiply(operand, subsystems)?,
    })
}

/// Multiplies a register by a statically known operand register on the
/// declared side.
#[derive(Debug, Clone)]
pub struct MultiplicationNode {
    pub register: String,
    pub side: MultiplySide,
    pub operand: VirtualRegister,
    /// The register rows the operand applies to; `None` means all of them.
    pub subsystems: Option<Vec<usize>>,
}

impl MultiplicationNode {
    pub fn footprint(&self) -> Vec<Footprint> {
        let subsystems = self
            .subsystems
            .clone()
            .unwrap_or_else(|| (0..self.operand.num_subsystems()).collect());
        vec![(self.register.clone(), subsystems, self.operand.kind())]
    }

    pub fn evaluate(&self, registers: &RegisterMap) -> Result<Vec<RegisterWrite>, Error> {
        let register = lookup_register(registers, &self.register)?;
        let subsystems = self
            .subsystems
            .clone()
            .unwrap_or_else(|| (0..register.num_subsystems()).collect());
        let values = apply_sided(register, &self.operand, Some(&subsystems), self.side)?;
        Ok(vec![RegisterWrite::Assign {
            name: self.register.clone(),
            subsystems,
            values,
        }])
    }
}

/// An angle of a word gate: a constant or a parameter-expression-table
/// index evaluated at sampling time.
#[derive(Debug, Clone, PartialEq)]
pub enum WordAngle {
    Value(f64),
    Param(usize),
}

impl WordAngle {
    fn resolve(&self, params: &[f64]) -> Result<f64, Error> {
        match self {
            WordAngle::Value(value) => Ok(*value),
            WordAngle::Param(idx) => params.get(*idx).copied().ok_or_else(|| {
                SamplexRuntimeError::InputNotFound(format!("parameter expression {idx}")).into()
            }),
        }
    }
}

/// One gate of a single-qubit word: a named fixed gate or a rotation.
#[derive(Debug, Clone, PartialEq)]
pub enum U2WordOp {
    Gate(String),
    Rz(WordAngle),
    Rx(WordAngle),
}

/// The unitary of a word gate.
pub fn word_matrix(op: &U2WordOp, params: &[f64]) -> Result<Mat2, Error> {
    match op {
        U2WordOp::Gate(name) => {
            let tableau = one_qubit_gate(name).ok_or_else(|| {
                SamplexRuntimeError::InputNotFound(format!("one-qubit gate '{name}'"))
            })?;
            let idx = C1_CATALOG
                .index_of(&tableau)
                .expect("every named one-qubit gate is in the catalog");
            Ok(*C1_CATALOG.matrix(idx))
        }
        U2WordOp::Rz(angle) => {
            let theta = angle.resolve(params)?;
            let half = theta / 2.0;
            Ok([
                [Complex64::from_polar(1.0, -half), Complex64::new(0.0, 0.0)],
                [Complex64::new(0.0, 0.0), Complex64::from_polar(1.0, half)],
            ])
        }
        U2WordOp::Rx(angle) => {
            let theta = angle.resolve(params)?;
            let (c, s) = ((theta / 2.0).cos(), (theta / 2.0).sin());
            Ok([
                [Complex64::new(c, 0.0), Complex64::new(0.0, -s)],
                [Complex64::new(0.0, -s), Complex64::new(c, 0.0)],
            ])
        }
    }
}

/// Builds a single-qubit U2 operand from a gate word (later word gates on
/// the left, as in circuit composition) and multiplies it into a register on
/// the declared side.
#[derive(Debug, Clone)]
pub struct U2ParametricMultiplicationNode {
    pub register: String,
    pub side: MultiplySide,
    pub word: Vec<U2WordOp>,
    pub subsystems: Vec<usize>,
}

impl U2ParametricMultiplicationNode {
    pub fn footprint(&self) -> Vec<Footprint> {
        vec![(self.register.clone(), self.subsystems.clone(), VirtualKind::U2)]
    }

    pub fn parameter_indices(&self) -> Vec<usize> {
        self.word
            .iter()
            .filter_map(|op| match op {
                U2WordOp::Rz(WordAngle::Param(idx)) | U2WordOp::Rx(WordAngle::Param(idx)) => {
                    Some(*idx)
                }
                _ => None,
            })
            .collect()
    }

    pub fn evaluate(
        &self,
        registers: &RegisterMap,
        params: &[f64],
    ) -> Result<Vec<RegisterWrite>, Error> {
        let register = lookup_register(registers, &self.register)?;

        let mut matrix = [
            [Complex64::one(), Complex64::zero()],
            [Complex64::zero(), Complex64::one()],
        ];
        for op in &self.word {
            let gate = word_matrix(op, params)?;
            matrix = mat_mul(&gate, &matrix);
        }

        let operand: VirtualRegister =
            U2Register::broadcast_matrix(matrix, self.subsystems.len()).into();
        let values = apply_sided(register, &operand, Some(&self.subsystems), self.side)?;
        Ok(vec![RegisterWrite::Assign {
            name: self.register.clone(),
            subsystems: self.subsystems.clone(),
            values,
        }])
    }
}

/// Multiplies a register by a basis bound in the input interface, on the
/// declared side.
///
/// The input is a 1-D `u8` array of Pauli or C1 indices, one per listed
/// subsystem, broadcast over randomizations. An unbound optional input
/// leaves the register untouched.
#[derive(Debug, Clone)]
pub struct ChangeBasisNode {
    pub register: String,
    pub input_name: String,
    pub source_kind: VirtualKind,
    pub side: MultiplySide,
    pub subsystems: Vec<usize>,
}

impl ChangeBasisNode {
    pub fn footprint(&self) -> Vec<Footprint> {
        vec![(self.register.clone(), self.subsystems.clone(), VirtualKind::U2)]
    }

    pub fn evaluate(
        &self,
        registers: &RegisterMap,
        inputs: &TensorInterface,
    ) -> Result<Vec<RegisterWrite>, Error> {
        let Some(values) = inputs.get(&self.input_name).and_then(|tensor| tensor.as_u8())
        else {
            return Ok(vec![]);
        };

        let register = lookup_register(registers, &self.register)?;
        let column = ndarray::Array2::from_shape_fn((self.subsystems.len(), 1), |(row, _)| {
            values[[row]]
        });
        let operand: VirtualRegister = match self.source_kind {
            VirtualKind::Pauli => PauliRegister::new(column).into(),
            VirtualKind::C1 => C1Register::new(column)
                .map_err(crate::error::Error::Register)?
                .into(),
            other => {
                return Err(SamplexRuntimeError::InputNotFound(format!(
                    "basis changes of kind '{other}' are not supported"
                ))
                .into());
            }
        };
        let operand = operand.convert_to(register.kind())?;
        let updated = apply_sided(register, &operand, Some(&self.subsystems), self.side)?;
        Ok(vec![RegisterWrite::Assign {
            name: self.register.clone(),
            subsystems: self.subsystems.clone(),
            values: updated,
        }])
    }
}

fn mat_mul(a: &Mat2, b: &Mat2) -> Mat2 {
    let mut out = [[Complex64::new(0.0, 0.0); 2]; 2];
    for row in 0..2 {
        for col in 0..2 {
            out[row][col] = a[row][0] * b[0][col] + a[row][1] * b[1][col];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn static_multiplication_targets_selected_rows() {
        let mut registers = RegisterMap::new();
        registers.insert(
            "reg".into(),
            PauliRegister::new(array![[0, 0], [1, 1]]).into(),
        );
        let node = MultiplicationNode {
            register: "reg".into(),
            side: MultiplySide::Right,
            operand: PauliRegister::new(array![[2]]).into(),
            subsystems: Some(vec![1]),
        };
        let writes = node.evaluate(&registers).unwrap();
        let RegisterWrite::Assign { subsystems, values, .. } = &writes[0] else {
            panic!();
        };
        assert_eq!(subsystems, &vec![1]);
        let VirtualRegister::Pauli(values) = values else { panic!() };
        assert_eq!(values.gates(), &array![[3, 3]]);
    }

    #[test]
    fn word_composition_matches_circuit_order() {
        // word [rz(pi), x]: the x is applied after the rotation, so the
        // operand matrix is X * Rz(pi)
        let node = U2ParametricMultiplicationNode {
            register: "reg".into(),
            side: MultiplySide::Left,
            word: vec![
                U2WordOp::Rz(WordAngle::Value(std::f64::consts::PI)),
                U2WordOp::Gate("x".into()),
            ],
            subsystems: vec![0],
        };
        let mut registers = RegisterMap::new();
        registers.insert("reg".into(), U2Register::identity(1, 1).into());
        let writes = node.evaluate(&registers, &[]).unwrap();
        let RegisterWrite::Assign { values, .. } = &writes[0] else {
            panic!();
        };
        let VirtualRegister::U2(values) = values else { panic!() };
        let matrix = values.matrix(0, 0);
        // X * Rz(pi) ~ diag-antidiagonal with opposite phases
        assert_abs_diff_eq!(matrix[0][0].norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix[0][1].norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn unbound_basis_change_is_a_noop() {
        let node = ChangeBasisNode {
            register: "reg".into(),
            input_name: "basis_changes.missing".into(),
            source_kind: VirtualKind::Pauli,
            side: MultiplySide::Left,
            subsystems: vec![0],
        };
        let mut registers = RegisterMap::new();
        registers.insert("reg".into(), U2Register::identity(1, 1).into());
        let writes = node.evaluate(&registers, &TensorInterface::default()).unwrap();
        assert!(writes.is_empty());
    }

    #[test]
    fn bound_basis_change_multiplies_the_register() {
        use crate::tensor::{Dtype, Tensor, TensorSpec};

        let node = ChangeBasisNode {
            register: "reg".into(),
            input_name: "basis_changes.b".into(),
            source_kind: VirtualKind::Pauli,
            side: MultiplySide::Right,
            subsystems: vec![0],
        };
        let mut registers = RegisterMap::new();
        registers.insert("reg".into(), U2Register::identity(1, 1).into());
        let mut inputs =
            TensorInterface::new([TensorSpec::new("basis_changes.b", &[1], Dtype::U8)]);
        inputs
            .bind("basis_changes.b", Tensor::from_u8_slice(&[2]))
            .unwrap();
        let writes = node.evaluate(&registers, &inputs).unwrap();
        let RegisterWrite::Assign { values, .. } = &writes[0] else {
            panic!();
        };
        let VirtualRegister::U2(values) = values else { panic!() };
        // identity * X = X
        assert_abs_diff_eq!(values.matrix(0, 0)[0][1].re, 1.0, epsilon = 1e-12);
    }
}
