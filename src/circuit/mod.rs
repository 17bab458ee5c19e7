//! The circuit model consumed and produced by the builder.
//!
//! Input circuits carry annotated boxes and symbolic angles; template
//! circuits have the same shape with indexed parameter placeholders in place
//! of concrete angles, plus the scope barriers and dressed layers inserted by
//! the builder.

mod gates;
mod param_expr;

pub use gates::Gate;
pub use param_expr::{Angle, ParamExpr};

use crate::annotations::Annotation;

/// One entry of a circuit's instruction list.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub operation: Operation,
    pub qubits: Vec<usize>,
    pub clbits: Vec<usize>,
}

/// The operation of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Gate(Gate),
    /// A synchronization marker with an optional label.
    Barrier(Option<String>),
    Measure,
    Box(BoxOp),
    IfElse(IfElseOp),
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Operation::Gate(gate) => gate.name(),
            Operation::Barrier(_) => "barrier",
            Operation::Measure => "measure",
            Operation::Box(_) => "box",
            Operation::IfElse(_) => "if_else",
        }
    }
}

/// A delimited, annotated region. The body is a sub-circuit with its own
/// qubit indexing; `Instruction::qubits` of the box maps body qubit `k` to
/// the outer qubit at position `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxOp {
    pub body: Circuit,
    pub annotations: Vec<Annotation>,
}

/// A two-branch conditional. The branch bodies share the qubit mapping of
/// the instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct IfElseOp {
    /// The classical bit tested and the value that selects the first branch.
    pub condition: (usize, bool),
    pub then_body: Circuit,
    pub else_body: Option<Circuit>,
}

/// A quantum circuit: a flat list of instructions over indexed qubits and
/// classical bits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Circuit {
    pub num_qubits: usize,
    pub num_clbits: usize,
    pub instructions: Vec<Instruction>,
}

impl Circuit {
    pub fn new(num_qubits: usize, num_clbits: usize) -> Self {
        Self {
            num_qubits,
            num_clbits,
            instructions: Vec::new(),
        }
    }

    pub fn push(&mut self, operation: Operation, qubits: Vec<usize>, clbits: Vec<usize>) {
        self.instructions.push(Instruction {
            operation,
            qubits,
            clbits,
        });
    }

    pub fn gate(&mut self, gate: Gate, qubits: &[usize]) {
        debug_assert_eq!(gate.num_qubits(), qubits.len());
        self.push(Operation::Gate(gate), qubits.to_vec(), vec![]);
    }

    pub fn h(&mut self, qubit: usize) {
        self.gate(Gate::H, &[qubit]);
    }

    pub fn sx(&mut self, qubit: usize) {
        self.gate(Gate::Sx, &[qubit]);
    }

    pub fn x(&mut self, qubit: usize) {
        self.gate(Gate::X, &[qubit]);
    }

    pub fn rz(&mut self, angle: impl Into<ParamExpr>, qubit: usize) {
        self.gate(Gate::Rz(Angle::Expr(angle.into())), &[qubit]);
    }

    pub fn rx(&mut self, angle: impl Into<ParamExpr>, qubit: usize) {
        self.gate(Gate::Rx(Angle::Expr(angle.into())), &[qubit]);
    }

    pub fn cx(&mut self, control: usize, target: usize) {
        self.gate(Gate::Cx, &[control, target]);
    }

    pub fn cz(&mut self, lhs: usize, rhs: usize) {
        self.gate(Gate::Cz, &[lhs, rhs]);
    }

    pub fn ecr(&mut self, lhs: usize, rhs: usize) {
        self.gate(Gate::Ecr, &[lhs, rhs]);
    }

    pub fn barrier(&mut self, label: Option<&str>) {
        let qubits: Vec<usize> = (0..self.num_qubits).collect();
        self.push(
            Operation::Barrier(label.map(str::to_string)),
            qubits,
            vec![],
        );
    }

    pub fn measure(&mut self, qubit: usize, clbit: usize) {
        self.push(Operation::Measure, vec![qubit], vec![clbit]);
    }

    /// Appends an annotated box over the given outer qubits. The body must
    /// have exactly `qubits.len()` qubits.
    pub fn add_box(&mut self, body: Circuit, annotations: Vec<Annotation>, qubits: &[usize]) {
        debug_assert_eq!(body.num_qubits, qubits.len());
        self.push(
            Operation::Box(BoxOp { body, annotations }),
            qubits.to_vec(),
            vec![],
        );
    }

    /// The number of distinct template parameter indices referenced by
    /// `Angle::Index` placeholders, assuming they are densely numbered.
    pub fn num_template_params(&self) -> usize {
        fn walk(circuit: &Circuit, max: &mut Option<usize>) {
            for instr in &circuit.instructions {
                match &instr.operation {
                    Operation::Gate(gate) => {
                        if let Some(Angle::Index(idx)) = gate.angle() {
                            *max = Some(max.map_or(*idx, |m: usize| m.max(*idx)));
                        }
                    }
                    Operation::Box(box_op) => walk(&box_op.body, max),
                    Operation::IfElse(if_else) => {
                        walk(&if_else.then_body, max);
                        if let Some(body) = &if_else.else_body {
                            walk(body, max);
                        }
                    }
                    _ => {}
                }
            }
        }
        let mut max = None;
        walk(self, &mut max);
        max.map_or(0, |m| m + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_append_instructions() {
        let mut circuit = Circuit::new(2, 1);
        circuit.h(0);
        circuit.cx(0, 1);
        circuit.measure(1, 0);
        assert_eq!(circuit.instructions.len(), 3);
        assert_eq!(circuit.instructions[1].qubits, vec![0, 1]);
    }

    #[test]
    fn template_parameter_count_spans_nested_blocks() {
        let mut inner = Circuit::new(1, 0);
        inner.gate(Gate::Rz(Angle::Index(4)), &[0]);
        let mut circuit = Circuit::new(1, 0);
        circuit.gate(Gate::Rz(Angle::Index(1)), &[0]);
        circuit.add_box(inner, vec![], &[0]);
        assert_eq!(circuit.num_template_params(), 5);
    }
}
