use crate::annotations::{BasisChangeMode, DressingMode, GroupMode, NoiseSite};
use crate::noise::NoiseModel;
use crate::synths::Synth;
use virtual_registers::registers::VirtualKind;

/// What a box collects: the dressed qubits, how to decompose the dressing,
/// and which side it attaches to. Filled in by the annotation parsers.
#[derive(Debug, Clone, Default)]
pub struct CollectionSpec {
    /// The box's outer qubits, sorted, one dressing row each.
    pub qubits: Vec<usize>,
    pub synth: Option<Synth>,
    pub dressing: Option<DressingMode>,
}

impl CollectionSpec {
    pub fn new(qubits: Vec<usize>) -> Self {
        Self {
            qubits,
            synth: None,
            dressing: None,
        }
    }
}

/// A parsed basis-change request.
#[derive(Debug, Clone)]
pub struct BasisSpec {
    pub input_name: String,
    pub source_kind: VirtualKind,
    pub mode: BasisChangeMode,
}

/// A parsed noise-injection request.
#[derive(Debug, Clone)]
pub struct NoiseSpec {
    pub noise_ref: String,
    pub modifier_ref: Option<String>,
    pub model: NoiseModel,
    pub site: Option<NoiseSite>,
}

/// What a box emits: random registers that flow out to other boxes. Filled
/// in by the annotation parsers and the gate-dependent classification.
#[derive(Debug, Clone, Default)]
pub struct EmissionSpec {
    pub qubits: Vec<usize>,
    pub twirl_group: Option<GroupMode>,
    pub noise: Option<NoiseSpec>,
    pub basis: Option<BasisSpec>,
    /// For gate-dependent twirling: the single 2Q gate type of the box.
    pub twirl_gate: Option<String>,
    /// For gate-dependent twirling: qubit pairs twirled with local C1, in
    /// gate operand order.
    pub entangling_pairs: Vec<(usize, usize)>,
    /// For gate-dependent twirling: qubits that fall back to Pauli.
    pub fallback_qubits: Vec<usize>,
}

impl EmissionSpec {
    pub fn new(qubits: Vec<usize>) -> Self {
        Self {
            qubits,
            ..Self::default()
        }
    }
}
