//! # virtual-registers: typed grids of random group elements
//!
//! This crate provides the group algebra underpinning randomized compilation:
//! *virtual registers*, which are 2-D grids holding one group element per
//! `(subsystem, randomization)` pair, together with the precomputed tables
//! and sampling distributions that act on them.
//!
//! # Features
//!
//! * **Four register kinds**: the projective Pauli group, the single-qubit
//!   Clifford group C1 (indexed through a canonical 24-element tableau
//!   catalog), arbitrary 2 x 2 unitaries, and sign bits. All kinds share one
//!   operation set: identity construction, right/left multiplication with
//!   broadcasting, inversion, slicing, assignment, and conversion along the
//!   admissible edges (Pauli and C1 lower into U2; Paulis project onto sign
//!   bits; sign bits lift to X-or-identity Paulis).
//!
//! * **Conjugation tables**: for each named entangler, tables that push
//!   Pauli and C1 elements past the gate, with a sentinel marking C1 (x) C1
//!   pairs that do not remain local under conjugation.
//!
//! * **Distributions**: uniform and balanced-uniform Paulis, Haar-random
//!   U2, uniform C1, and the locality-preserving C1 (x) C1 distribution.
//!
//! ## Example
//!
//! ```rust
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//! use virtual_registers::distributions::UniformPauli;
//! use virtual_registers::registers::VirtualRegister;
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let paulis: VirtualRegister = UniformPauli::new(3).sample(100, &mut rng).into();
//!
//! // A register composed with its elementwise inverse is the identity.
//! let identity = paulis.multiply(&paulis.invert(), None).unwrap();
//! assert_eq!(identity, VirtualRegister::identity(paulis.kind(), 3, 100));
//! ```

pub mod distributions;
pub mod error;
pub mod registers;
pub mod tableau;
pub mod tables;

pub mod prelude {
    pub use crate::distributions::*;
    pub use crate::error::*;
    pub use crate::registers::*;
}
