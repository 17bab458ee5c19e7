//! # samplex: a compiler from annotated circuits to sampling programs
//!
//! This crate compiles a quantum circuit containing annotated *boxes*
//! (delimited regions requesting randomized compilation operations such as
//! twirling, basis changes, and noise injection) into a two-part artifact:
//!
//! * a **template circuit** of the same shape as the input, with indexed
//!   parameter placeholders in place of concrete angles, and
//! * a **samplex**, an executable DAG program that, run with a seed,
//!   produces concrete numerical values to bind into the template — one
//!   random instance of the requested transformation per randomization.
//!
//! A samplex node either samples random group elements (Paulis, single-qubit
//! Cliffords, Lindblad noise), propagates them through the circuit's fixed
//! entanglers, composes single-qubit gates symbolically, or collects
//! numerical parameter values for the template. A single samplex is
//! typically executed thousands of times to generate a Monte-Carlo ensemble.
//!
//! ## Typical workflow
//!
//! 1. Build an annotated [`Circuit`] with [`Twirl`] (and friends) on its
//!    boxes.
//! 2. Compile it with [`build`] into a template and a [`Samplex`].
//! 3. Finalize the samplex and call [`Samplex::sample`] to draw
//!    randomizations.
//!
//! ```rust
//! use samplex::annotations::Twirl;
//! use samplex::circuit::Circuit;
//! use samplex::samplex::SampleOptions;
//!
//! // 1. an annotated two-qubit circuit: a twirled box around a CX
//! let mut circuit = Circuit::new(2, 0);
//! let mut body = Circuit::new(2, 0);
//! body.cx(0, 1);
//! circuit.add_box(body, vec![Twirl::left().into()], &[0, 1]);
//!
//! circuit.add_box(Circuit::new(2, 0), vec![Twirl::right().into()], &[0, 1]);
//!
//! // 2. compile
//! let (template, mut samplex) = samplex::build(&circuit).unwrap();
//! samplex.finalize().unwrap();
//!
//! // 3. sample
//! let inputs = samplex.inputs();
//! let output = samplex
//!     .sample(&inputs, 100, &SampleOptions::default())
//!     .unwrap();
//! let values = output.get("parameter_values").unwrap();
//! assert_eq!(values.shape()[0], 100);
//! # let _ = template;
//! ```

pub mod annotations;
pub mod builders;
pub mod circuit;
pub mod error;
pub mod graph_utils;
pub mod noise;
pub mod params;
pub mod partition;
pub mod pre_samplex;
pub mod samplex;
pub mod serialization;
pub mod synths;
pub mod tensor;

pub use builders::{build, pre_build};
pub use circuit::Circuit;
pub use error::{Error, Result};
pub use samplex::Samplex;

pub use annotations::Twirl;

// the register algebra crate, re-exported for downstream use
pub use virtual_registers;

pub mod prelude {
    pub use crate::annotations::*;
    pub use crate::builders::{build, pre_build};
    pub use crate::circuit::{Angle, Circuit, Gate, ParamExpr};
    pub use crate::error::*;
    pub use crate::samplex::{SampleOptions, Samplex};
    pub use crate::serialization::{samplex_from_json, samplex_to_json};
    pub use crate::tensor::{Tensor, TensorInterface};
}
