use crate::registers::VirtualKind;
use thiserror::Error;

/// A specialized `Result` type for virtual register operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
/// Errors that can occur when constructing or operating on virtual registers.
pub enum Error {
    /// Error for operating on registers with incompatible shapes.
    #[error(
        "Registers of shape ({}, {}) and ({}, {}) are incompatible for {}.",
        lhs_subsystems,
        lhs_randomizations,
        rhs_subsystems,
        rhs_randomizations,
        operation
    )]
    ShapeMismatch {
        operation: &'static str,
        lhs_subsystems: usize,
        lhs_randomizations: usize,
        rhs_subsystems: usize,
        rhs_randomizations: usize,
    },

    /// Error for mixing register kinds in a single group operation.
    #[error("Expected a register of kind '{expected}', found '{found}'.")]
    KindMismatch {
        expected: VirtualKind,
        found: VirtualKind,
    },

    /// Error for conversions outside of the admissible set.
    #[error("Converting a '{from}' register to kind '{to}' is not supported.")]
    UnsupportedConversion { from: VirtualKind, to: VirtualKind },

    /// Error for subsystem indices outside of a register.
    #[error("Subsystem index {0} is out of bounds for a register with {1} subsystems.")]
    SubsystemOutOfBounds(usize, usize),

    /// Error for invalid element values, e.g. a C1 index above 23.
    #[error("Value {0} is not a valid element index for kind '{1}'.")]
    InvalidElement(u8, VirtualKind),

    /// Error for distributions over pairs when the subsystem count is odd.
    #[error("num_subsystems must be even, got {0}.")]
    OddSubsystemCount(usize),

    /// Error for gate names absent from the conjugation tables.
    #[error("Unknown gate '{0}'. No conjugation table is available for it.")]
    UnknownGate(String),

    /// Error for using a one-qubit gate where a two-qubit gate is required.
    #[error("Gate '{0}' is not a two-qubit gate.")]
    NotATwoQubitGate(String),

    /// Error for conjugations that leave the local Clifford group.
    #[error("C1 values did not remain local after conjugation by '{0}'.")]
    NonLocalConjugation(String),
}
