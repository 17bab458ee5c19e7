use thiserror::Error;
use virtual_registers::registers::VirtualKind;

/// A specialized `Result` type for samplex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while interpreting box annotations.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Cannot specify more than one '{0}' annotation on a box.")]
    DuplicateAnnotation(&'static str),

    #[error("Cannot use different synthesizers on different annotations on the same box.")]
    ConflictingSynths,

    #[error("Cannot use different dressings on different annotations on the same box.")]
    ConflictingDressings,

    #[error("Cannot specify multiple frame changing annotations on the same box.")]
    MultipleFrameChanges,

    #[error("Inject noise requires a twirling annotation on the same box.")]
    NoiseWithoutTwirl,

    #[error("Noise site '{site}' is incompatible with a box dressed '{dressing}'.")]
    NoiseSiteMismatch { site: String, dressing: String },

    #[error("Cannot use gate-dependent twirling with duplicate 2Q gates on qubits ({0}, {1}).")]
    DuplicateEntangler(usize, usize),

    #[error(
        "Cannot use gate-dependent twirling with 2Q gates on partially overlapping qubit pairs."
    )]
    OverlappingEntanglers,

    #[error("Cannot use gate-dependent twirling with multiple 2Q gate types: {0:?}.")]
    MultipleEntanglerTypes(Vec<String>),
}

/// Errors raised when the builder cannot represent a box semantically.
#[derive(Error, Debug)]
pub enum SamplexBuildError {
    #[error("Cannot measure the same qubit twice in a twirling box.")]
    DoubleMeasurement,

    #[error("Boxes with measurements cannot have dressing=right.")]
    MeasurementInRightDressedBox,

    #[error("Cannot use a {0} twirl in a box with measurements.")]
    MeasurementWithNonPauliTwirl(String),

    #[error("No operations allowed after a measurement in a measurement twirling box.")]
    OperationAfterMeasurement,

    #[error("Cannot have a single-qubit gate to the right of an entangler when dressing=left.")]
    SingleQubitAfterEntangler,

    #[error("Cannot have a single-qubit gate to the left of an entangler when dressing=right.")]
    SingleQubitBeforeEntangler,

    #[error("Cannot have non-clifford gate between a left-dressed box and a right-dressed box.")]
    NonCliffordBetweenDressings,

    #[error("Gate '{0}' has no conjugation table and cannot cross a virtual register flow.")]
    UnsupportedEntangler(String),

    #[error("Entangler on qubits ({0}, {1}) straddles the boundary of a virtual register flow.")]
    EntanglerAcrossFlowBoundary(usize, usize),

    #[error("The qubit {0} could not be found when recursing into a box of the input circuit.")]
    UnknownQubit(usize),

    #[error("A register of kind '{0}' cannot be propagated past a Clifford operation.")]
    UnpropagatableKind(VirtualKind),

    #[error("Instruction '{0}' is not supported inside a dressed box.")]
    UnsupportedBoxInstruction(String),
}

/// Errors raised when a samplex node receives structurally invalid
/// arguments, or when graph validation fails at finalization time.
#[derive(Error, Debug)]
pub enum SamplexConstructionError {
    #[error("Node reads register '{0}', which no ancestor instantiates.")]
    MissingRegister(String),

    #[error("Register '{0}' is instantiated more than once.")]
    DuplicateRegister(String),

    #[error(
        "Node expects register '{name}' to have kind '{expected}', found non-convertible '{found}'."
    )]
    RegisterKindMismatch {
        name: String,
        expected: VirtualKind,
        found: VirtualKind,
    },

    #[error(
        "Node expects register '{name}' to span subsystem {subsystem}, but it has {num_subsystems}."
    )]
    SubsystemOutOfRange {
        name: String,
        subsystem: usize,
        num_subsystems: usize,
    },

    #[error("'slice_idxs' for '{0}' must have exactly one axis.")]
    BadSliceShape(String),

    #[error("A node references parameter index {index}, but only {count} expressions exist.")]
    MissingParameterExpression { index: usize, count: usize },

    #[error("Cannot add nodes or edges to a finalized samplex.")]
    Finalized,

    #[error("An input with name '{0}' already exists.")]
    DuplicateInput(String),

    #[error("An output with name '{0}' already exists.")]
    DuplicateOutput(String),

    #[error("A noise requirement with reference '{0}' already exists.")]
    DuplicateNoiseRequirement(String),

    #[error("Parameter values of length {found} were provided, but {expected} are required.")]
    ParameterCountMismatch { expected: usize, found: usize },

    #[error("Invalid Pauli character '{0}' in a noise term label.")]
    InvalidPauliLabel(char),
}

/// Errors raised while a finalized samplex is sampling.
#[derive(Error, Debug)]
pub enum SamplexRuntimeError {
    #[error("The samplex has not been finalized yet, call `finalize()`.")]
    NotFinalized,

    #[error("The samplex input is missing values for: {0}.")]
    MissingInputs(String),

    #[error("C1 values did not remain local after conjugation by '{0}'.")]
    NonLocalConjugation(String),

    #[error("Register '{0}' was not found at evaluation time.")]
    RegisterNotFound(String),

    #[error("Input '{0}' was not found at evaluation time.")]
    InputNotFound(String),

    #[error("The worker pool could not be built: {0}")]
    WorkerPool(String),
}

/// Errors raised when an input bundle fails specification validation.
#[derive(Error, Debug)]
pub enum SamplexInputError {
    #[error("No specification named '{0}'.")]
    UnknownName(String),

    #[error("Input '{name}' expects shape {expected:?}, received shape {found:?}.")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Input '{name}' expects dtype '{expected}', received '{found}'.")]
    DtypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors raised during samplex serialization and deserialization.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Unknown serialized type id '{0}'.")]
    UnknownTypeId(String),

    #[error("SSV {found} is outside of the supported range [{min}, {max}].")]
    UnsupportedSsv { found: u32, min: u32, max: u32 },

    #[error("TSV {found} is outside of the supported range [{min}, {max}] for type '{type_id}'.")]
    UnsupportedTsv {
        type_id: &'static str,
        found: u32,
        min: u32,
        max: u32,
    },

    #[error(
        "Type '{type_id}' was introduced at SSV {introduced} and cannot be written at SSV {requested}."
    )]
    TypePostdatesSsv {
        type_id: &'static str,
        introduced: u32,
        requested: u32,
    },

    #[error("Malformed field '{field}': {reason}")]
    Malformed { field: String, reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// The top-level error type, covering every stage from building to
/// serialization.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    SamplexBuild(#[from] SamplexBuildError),

    #[error(transparent)]
    Construction(#[from] SamplexConstructionError),

    #[error(transparent)]
    Runtime(#[from] SamplexRuntimeError),

    #[error(transparent)]
    Input(#[from] SamplexInputError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Register(#[from] virtual_registers::error::Error),
}
