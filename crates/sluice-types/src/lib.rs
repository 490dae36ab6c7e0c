//! Sluice Types
//!
//! Shared data definitions for the Sluice rule engine: runtime [`Value`]s, the
//! static [`Type`] lattice used by the validator, the [`Message`] a pipeline
//! operates on and the runtime [`EvaluationError`] raised while evaluating a
//! rule. Both `sluice-functions` and `sluice-core` depend on this crate so the
//! function catalog never has to depend on the interpreter.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod message;
mod types;
mod value;

pub use error::EvaluationError;
pub use message::Message;
pub use types::Type;
pub use value::Value;
