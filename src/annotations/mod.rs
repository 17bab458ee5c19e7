//! Box annotations: directives attached to `box` instructions that request
//! randomized compilation operations on the box contents.

use std::fmt;

use crate::noise::NoiseModel;

/// Which gate set and distribution to twirl with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupMode {
    /// Sample the Pauli group uniformly and i.i.d.
    Pauli,
    /// Sample the Pauli group, balancing the proportions of I, X, Y, and Z.
    BalancedPauli,
    /// Sample C1 on qubits involved in 2Q gates, Pauli on the rest.
    LocalC1,
}

impl GroupMode {
    pub fn name(self) -> &'static str {
        match self {
            GroupMode::Pauli => "pauli",
            GroupMode::BalancedPauli => "balanced_pauli",
            GroupMode::LocalC1 => "local_c1",
        }
    }

    /// Whether the group depends on the gates in the box body.
    pub fn is_gate_dependent(self) -> bool {
        matches!(self, GroupMode::LocalC1)
    }
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side of a box the dressing instructions attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DressingMode {
    Left,
    Right,
}

impl DressingMode {
    pub fn name(self) -> &'static str {
        match self {
            DressingMode::Left => "left",
            DressingMode::Right => "right",
        }
    }
}

impl fmt::Display for DressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How to decompose the single-qubit gates of a dressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecompositionMode {
    RzSx,
    RzRx,
    Corpse,
}

impl DecompositionMode {
    pub fn name(self) -> &'static str {
        match self {
            DecompositionMode::RzSx => "rzsx",
            DecompositionMode::RzRx => "rzrx",
            DecompositionMode::Corpse => "corpse",
        }
    }
}

/// Whether a basis change applies to state preparation or measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasisChangeMode {
    Prep,
    Meas,
}

/// Which edge of a box noise is injected at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseSite {
    Left,
    Right,
}

/// Directive to twirl the contents of a box instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Twirl {
    pub group: GroupMode,
    pub dressing: DressingMode,
    pub decomposition: DecompositionMode,
}

impl Twirl {
    pub fn new(group: GroupMode, dressing: DressingMode, decomposition: DecompositionMode) -> Self {
        Self {
            group,
            dressing,
            decomposition,
        }
    }

    pub fn left() -> Self {
        Self::default()
    }

    pub fn right() -> Self {
        Self {
            dressing: DressingMode::Right,
            ..Self::default()
        }
    }
}

impl Default for Twirl {
    fn default() -> Self {
        Self {
            group: GroupMode::Pauli,
            dressing: DressingMode::Left,
            decomposition: DecompositionMode::RzSx,
        }
    }
}

/// Directive to change the preparation or measurement basis of a box using
/// values bound at sampling time under `basis_changes.<ref>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBasis {
    pub mode: BasisChangeMode,
    pub reference: String,
    pub dressing: DressingMode,
    pub decomposition: DecompositionMode,
}

/// Directive to multiply a box dressing by single-qubit Cliffords bound at
/// sampling time under `local_cliffords.<ref>`.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectLocalClifford {
    pub reference: String,
    pub dressing: DressingMode,
    pub decomposition: DecompositionMode,
}

/// Directive to inject signed samples of a Pauli-Lindblad noise map at one
/// edge of a box. The rates are bound at sampling time under
/// `noise_maps.<ref>`, optionally scaled through `modifier_ref`.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectNoise {
    pub reference: String,
    pub model: NoiseModel,
    pub modifier_ref: Option<String>,
    /// The box edge the noise attaches to. Must agree with the edge the
    /// box's dressing emits at; `None` picks that edge.
    pub site: Option<NoiseSite>,
}

impl InjectNoise {
    pub fn new(reference: impl Into<String>, model: NoiseModel) -> Self {
        Self {
            reference: reference.into(),
            model,
            modifier_ref: None,
            site: None,
        }
    }

    pub fn with_modifier(mut self, modifier_ref: impl Into<String>) -> Self {
        self.modifier_ref = Some(modifier_ref.into());
        self
    }
}

/// Any recognized box annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Twirl(Twirl),
    ChangeBasis(ChangeBasis),
    InjectLocalClifford(InjectLocalClifford),
    InjectNoise(InjectNoise),
}

impl Annotation {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Annotation::Twirl(_) => "Twirl",
            Annotation::ChangeBasis(_) => "ChangeBasis",
            Annotation::InjectLocalClifford(_) => "InjectLocalClifford",
            Annotation::InjectNoise(_) => "InjectNoise",
        }
    }
}

impl From<Twirl> for Annotation {
    fn from(twirl: Twirl) -> Self {
        Annotation::Twirl(twirl)
    }
}

impl From<ChangeBasis> for Annotation {
    fn from(annotation: ChangeBasis) -> Self {
        Annotation::ChangeBasis(annotation)
    }
}

impl From<InjectLocalClifford> for Annotation {
    fn from(annotation: InjectLocalClifford) -> Self {
        Annotation::InjectLocalClifford(annotation)
    }
}

impl From<InjectNoise> for Annotation {
    fn from(annotation: InjectNoise) -> Self {
        Annotation::InjectNoise(annotation)
    }
}
