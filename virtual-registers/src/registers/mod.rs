//! Virtual registers: 2-D grids of random group elements.
//!
//! A virtual register holds one group element per `(subsystem,
//! randomization)` pair. Four kinds exist, one per supported group. All
//! kinds share the same operation set: identity construction, subsystem
//! slicing and assignment, right/left multiplication (with broadcasting over
//! a single-subsystem or single-randomization operand), inversion, and
//! conversion into other kinds where admissible.

mod c1;
mod pauli;
mod u2;
mod z2;

pub use c1::C1Register;
pub use pauli::{PauliRegister, pauli_phase_exponent};
pub use u2::U2Register;
pub use z2::Z2Register;

use std::fmt;

use crate::error::{Error, Result};

/// Name identifiers for virtual register kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualKind {
    /// The projective Pauli group.
    Pauli,
    /// The single-qubit Clifford group.
    C1,
    /// The 2 x 2 unitary group.
    U2,
    /// The two-element cyclic group.
    Z2,
}

impl VirtualKind {
    /// The stable string form used in serialized data.
    pub fn name(self) -> &'static str {
        match self {
            VirtualKind::Pauli => "pauli",
            VirtualKind::C1 => "c1",
            VirtualKind::U2 => "u2",
            VirtualKind::Z2 => "z2",
        }
    }

    /// Parses the stable string form.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pauli" => Some(VirtualKind::Pauli),
            "c1" => Some(VirtualKind::C1),
            "u2" => Some(VirtualKind::U2),
            "z2" => Some(VirtualKind::Z2),
            _ => None,
        }
    }

    /// The kinds this kind can be converted to. U2 is a terminal sink.
    pub fn convertible_kinds(self) -> &'static [VirtualKind] {
        match self {
            VirtualKind::Pauli => &[VirtualKind::Pauli, VirtualKind::U2, VirtualKind::Z2],
            VirtualKind::C1 => &[VirtualKind::C1, VirtualKind::U2],
            VirtualKind::U2 => &[VirtualKind::U2],
            VirtualKind::Z2 => &[VirtualKind::Z2, VirtualKind::Pauli],
        }
    }

    /// Whether a register of this kind can be converted to `target`.
    pub fn convertible_to(self, target: VirtualKind) -> bool {
        self.convertible_kinds().contains(&target)
    }
}

impl fmt::Display for VirtualKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validates operand shapes for an out-of-place product, returning the
/// number of randomizations of the result.
pub(crate) fn product_columns(
    operation: &'static str,
    lhs: (usize, usize),
    rhs: (usize, usize),
) -> Result<usize> {
    let columns = lhs.1.max(rhs.1);
    let rows_ok = rhs.0 == lhs.0 || rhs.0 == 1;
    let cols_ok = (lhs.1 == columns || lhs.1 == 1) && (rhs.1 == columns || rhs.1 == 1);
    if rows_ok && cols_ok {
        Ok(columns)
    } else {
        Err(Error::ShapeMismatch {
            operation,
            lhs_subsystems: lhs.0,
            lhs_randomizations: lhs.1,
            rhs_subsystems: rhs.0,
            rhs_randomizations: rhs.1,
        })
    }
}

/// Validates operand shapes for an in-place product.
pub(crate) fn check_inplace(
    operation: &'static str,
    lhs: (usize, usize),
    rhs: (usize, usize),
) -> Result<()> {
    if (rhs.0 == lhs.0 || rhs.0 == 1) && (rhs.1 == lhs.1 || rhs.1 == 1) {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            operation,
            lhs_subsystems: lhs.0,
            lhs_randomizations: lhs.1,
            rhs_subsystems: rhs.0,
            rhs_randomizations: rhs.1,
        })
    }
}

/// Broadcast index resolution: a length-one axis repeats.
#[inline]
pub(crate) fn bcast(idx: usize, len: usize) -> usize {
    if len == 1 { 0 } else { idx }
}

pub(crate) fn check_subsystems(idxs: &[usize], num_subsystems: usize) -> Result<()> {
    for &idx in idxs {
        if idx >= num_subsystems {
            return Err(Error::SubsystemOutOfBounds(idx, num_subsystems));
        }
    }
    Ok(())
}

/// A register of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualRegister {
    Pauli(PauliRegister),
    C1(C1Register),
    U2(U2Register),
    Z2(Z2Register),
}

macro_rules! dispatch {
    ($self:expr, $reg:ident => $body:expr) => {
        match $self {
            VirtualRegister::Pauli($reg) => $body,
            VirtualRegister::C1($reg) => $body,
            VirtualRegister::U2($reg) => $body,
            VirtualRegister::Z2($reg) => $body,
        }
    };
}

macro_rules! dispatch_pair {
    ($self:expr, $other:expr, $lhs:ident, $rhs:ident => $body:expr) => {
        match ($self, $other) {
            (VirtualRegister::Pauli($lhs), VirtualRegister::Pauli($rhs)) => $body,
            (VirtualRegister::C1($lhs), VirtualRegister::C1($rhs)) => $body,
            (VirtualRegister::U2($lhs), VirtualRegister::U2($rhs)) => $body,
            (VirtualRegister::Z2($lhs), VirtualRegister::Z2($rhs)) => $body,
            (lhs, rhs) => {
                return Err(Error::KindMismatch {
                    expected: lhs.kind(),
                    found: rhs.kind(),
                });
            }
        }
    };
}

impl VirtualRegister {
    /// The identity register of the given kind and shape.
    pub fn identity(kind: VirtualKind, num_subsystems: usize, num_randomizations: usize) -> Self {
        match kind {
            VirtualKind::Pauli => {
                VirtualRegister::Pauli(PauliRegister::identity(num_subsystems, num_randomizations))
            }
            VirtualKind::C1 => {
                VirtualRegister::C1(C1Register::identity(num_subsystems, num_randomizations))
            }
            VirtualKind::U2 => {
                VirtualRegister::U2(U2Register::identity(num_subsystems, num_randomizations))
            }
            VirtualKind::Z2 => {
                VirtualRegister::Z2(Z2Register::identity(num_subsystems, num_randomizations))
            }
        }
    }

    pub fn kind(&self) -> VirtualKind {
        match self {
            VirtualRegister::Pauli(_) => VirtualKind::Pauli,
            VirtualRegister::C1(_) => VirtualKind::C1,
            VirtualRegister::U2(_) => VirtualKind::U2,
            VirtualRegister::Z2(_) => VirtualKind::Z2,
        }
    }

    pub fn num_subsystems(&self) -> usize {
        dispatch!(self, reg => reg.num_subsystems())
    }

    pub fn num_randomizations(&self) -> usize {
        dispatch!(self, reg => reg.num_randomizations())
    }

    /// The product `self * other` on the selected subsystems of `self`
    /// (all of them when `subsystems` is `None`).
    pub fn multiply(&self, other: &VirtualRegister, subsystems: Option<&[usize]>) -> Result<Self> {
        dispatch_pair!(self, other, lhs, rhs => lhs.multiply(rhs, subsystems).map(Into::into))
    }

    /// The product `other * self` on the selected subsystems of `self`.
    pub fn left_multiply(
        &self,
        other: &VirtualRegister,
        subsystems: Option<&[usize]>,
    ) -> Result<Self> {
        dispatch_pair!(self, other, lhs, rhs => lhs.left_multiply(rhs, subsystems).map(Into::into))
    }

    /// Replaces the selected rows with `self * other`.
    pub fn inplace_multiply(
        &mut self,
        other: &VirtualRegister,
        subsystems: Option<&[usize]>,
    ) -> Result<()> {
        dispatch_pair!(self, other, lhs, rhs => lhs.inplace_multiply(rhs, subsystems))
    }

    /// Replaces the selected rows with `other * self`.
    pub fn left_inplace_multiply(
        &mut self,
        other: &VirtualRegister,
        subsystems: Option<&[usize]>,
    ) -> Result<()> {
        dispatch_pair!(self, other, lhs, rhs => lhs.left_inplace_multiply(rhs, subsystems))
    }

    /// The register of elementwise group inverses.
    pub fn invert(&self) -> Self {
        match self {
            VirtualRegister::Pauli(reg) => VirtualRegister::Pauli(reg.invert()),
            VirtualRegister::C1(reg) => VirtualRegister::C1(reg.invert()),
            VirtualRegister::U2(reg) => VirtualRegister::U2(reg.invert()),
            VirtualRegister::Z2(reg) => VirtualRegister::Z2(reg.invert()),
        }
    }

    /// A new register holding the selected subsystem rows.
    pub fn slice(&self, subsystems: &[usize]) -> Result<Self> {
        match self {
            VirtualRegister::Pauli(reg) => reg.slice(subsystems).map(VirtualRegister::Pauli),
            VirtualRegister::C1(reg) => reg.slice(subsystems).map(VirtualRegister::C1),
            VirtualRegister::U2(reg) => reg.slice(subsystems).map(VirtualRegister::U2),
            VirtualRegister::Z2(reg) => reg.slice(subsystems).map(VirtualRegister::Z2),
        }
    }

    /// Overwrites the selected subsystem rows with the rows of `values`.
    pub fn assign(&mut self, subsystems: &[usize], values: &VirtualRegister) -> Result<()> {
        dispatch_pair!(self, values, lhs, rhs => lhs.assign(subsystems, rhs))
    }

    /// Converts to the target kind, or fails if the conversion is not
    /// admissible.
    pub fn convert_to(&self, target: VirtualKind) -> Result<Self> {
        let source = self.kind();
        if !source.convertible_to(target) {
            return Err(Error::UnsupportedConversion {
                from: source,
                to: target,
            });
        }
        Ok(match (self, target) {
            (reg, target) if reg.kind() == target => reg.clone(),
            (VirtualRegister::Pauli(reg), VirtualKind::U2) => VirtualRegister::U2(reg.to_u2()),
            (VirtualRegister::Pauli(reg), VirtualKind::Z2) => VirtualRegister::Z2(reg.to_z2()),
            (VirtualRegister::C1(reg), VirtualKind::U2) => VirtualRegister::U2(reg.to_u2()),
            (VirtualRegister::Z2(reg), VirtualKind::Pauli) => {
                VirtualRegister::Pauli(reg.to_pauli())
            }
            _ => unreachable!("conversion admissibility already checked"),
        })
    }
}

impl From<PauliRegister> for VirtualRegister {
    fn from(reg: PauliRegister) -> Self {
        VirtualRegister::Pauli(reg)
    }
}

impl From<C1Register> for VirtualRegister {
    fn from(reg: C1Register) -> Self {
        VirtualRegister::C1(reg)
    }
}

impl From<U2Register> for VirtualRegister {
    fn from(reg: U2Register) -> Self {
        VirtualRegister::U2(reg)
    }
}

impl From<Z2Register> for VirtualRegister {
    fn from(reg: Z2Register) -> Self {
        VirtualRegister::Z2(reg)
    }
}
