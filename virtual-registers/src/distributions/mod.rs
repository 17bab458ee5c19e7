//! Distributions over virtual registers.
//!
//! A distribution knows which register kind it samples and how many
//! subsystems the sampled registers span; `sample` draws a register with one
//! column per requested randomization.

mod balanced_uniform_pauli;
mod haar_u2;
mod uniform_c1;
mod uniform_local_c1;
mod uniform_pauli;

pub use balanced_uniform_pauli::BalancedUniformPauli;
pub use haar_u2::HaarU2;
pub use uniform_c1::UniformC1;
pub use uniform_local_c1::UniformLocalC1;
pub use uniform_pauli::UniformPauli;

use rand::rngs::StdRng;

use crate::registers::{VirtualKind, VirtualRegister};

/// A distribution over virtual registers of a fixed kind and width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Distribution {
    UniformPauli(UniformPauli),
    BalancedUniformPauli(BalancedUniformPauli),
    HaarU2(HaarU2),
    UniformC1(UniformC1),
    UniformLocalC1(UniformLocalC1),
}

impl Distribution {
    /// The kind of register this distribution samples.
    pub fn register_kind(&self) -> VirtualKind {
        match self {
            Distribution::UniformPauli(_) | Distribution::BalancedUniformPauli(_) => {
                VirtualKind::Pauli
            }
            Distribution::HaarU2(_) => VirtualKind::U2,
            Distribution::UniformC1(_) | Distribution::UniformLocalC1(_) => VirtualKind::C1,
        }
    }

    /// The number of subsystems of each sampled register.
    pub fn num_subsystems(&self) -> usize {
        match self {
            Distribution::UniformPauli(dist) => dist.num_subsystems,
            Distribution::BalancedUniformPauli(dist) => dist.num_subsystems,
            Distribution::HaarU2(dist) => dist.num_subsystems,
            Distribution::UniformC1(dist) => dist.num_subsystems,
            Distribution::UniformLocalC1(dist) => dist.num_subsystems(),
        }
    }

    /// Draws a register of shape `(num_subsystems, size)`.
    pub fn sample(&self, size: usize, rng: &mut StdRng) -> VirtualRegister {
        match self {
            Distribution::UniformPauli(dist) => dist.sample(size, rng).into(),
            Distribution::BalancedUniformPauli(dist) => dist.sample(size, rng).into(),
            Distribution::HaarU2(dist) => dist.sample(size, rng).into(),
            Distribution::UniformC1(dist) => dist.sample(size, rng).into(),
            Distribution::UniformLocalC1(dist) => dist.sample(size, rng).into(),
        }
    }
}

impl From<UniformPauli> for Distribution {
    fn from(dist: UniformPauli) -> Self {
        Distribution::UniformPauli(dist)
    }
}

impl From<BalancedUniformPauli> for Distribution {
    fn from(dist: BalancedUniformPauli) -> Self {
        Distribution::BalancedUniformPauli(dist)
    }
}

impl From<HaarU2> for Distribution {
    fn from(dist: HaarU2) -> Self {
        Distribution::HaarU2(dist)
    }
}

impl From<UniformC1> for Distribution {
    fn from(dist: UniformC1) -> Self {
        Distribution::UniformC1(dist)
    }
}

impl From<UniformLocalC1> for Distribution {
    fn from(dist: UniformLocalC1) -> Self {
        Distribution::UniformLocalC1(dist)
    }
}
