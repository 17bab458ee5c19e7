use std::fmt;

use super::param_expr::Angle;

/// A gate acting on one or two qubits.
///
/// Fixed one-qubit gates and the named entanglers are Clifford; the
/// rotations are not (except at special angles, which the builder does not
/// attempt to recognize).
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    // Fixed single-qubit Cliffords
    Id,
    H,
    S,
    Sdg,
    Sx,
    X,
    Y,
    Z,
    // Parametric single-qubit rotations
    Rz(Angle),
    Rx(Angle),
    // Two-qubit entanglers
    Cx,
    Cz,
    Ecr,
    Swap,
}

impl Gate {
    /// The lowercase gate name, matching the conjugation table keys.
    pub fn name(&self) -> &'static str {
        match self {
            Gate::Id => "id",
            Gate::H => "h",
            Gate::S => "s",
            Gate::Sdg => "sdg",
            Gate::Sx => "sx",
            Gate::X => "x",
            Gate::Y => "y",
            Gate::Z => "z",
            Gate::Rz(_) => "rz",
            Gate::Rx(_) => "rx",
            Gate::Cx => "cx",
            Gate::Cz => "cz",
            Gate::Ecr => "ecr",
            Gate::Swap => "swap",
        }
    }

    pub fn num_qubits(&self) -> usize {
        match self {
            Gate::Cx | Gate::Cz | Gate::Ecr | Gate::Swap => 2,
            _ => 1,
        }
    }

    pub fn is_clifford(&self) -> bool {
        !matches!(self, Gate::Rz(_) | Gate::Rx(_))
    }

    pub fn is_parametric(&self) -> bool {
        matches!(self, Gate::Rz(_) | Gate::Rx(_))
    }

    /// The angle of a rotation gate.
    pub fn angle(&self) -> Option<&Angle> {
        match self {
            Gate::Rz(angle) | Gate::Rx(angle) => Some(angle),
            _ => None,
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::param_expr::ParamExpr;

    #[test]
    fn rotations_are_not_clifford() {
        assert!(!Gate::Rz(Angle::value(0.3)).is_clifford());
        assert!(!Gate::Rx(Angle::Expr(ParamExpr::parameter("a"))).is_clifford());
        assert!(Gate::H.is_clifford());
        assert!(Gate::Cx.is_clifford());
    }

    #[test]
    fn qubit_counts() {
        assert_eq!(Gate::H.num_qubits(), 1);
        assert_eq!(Gate::Ecr.num_qubits(), 2);
    }
}
