//! The function catalog of the Sluice rule language.
//!
//! Every function callable from a rule is described by a
//! [`FunctionDescriptor`] and registered in a [`FunctionRegistry`] together
//! with its invoke closure. The validator resolves calls against the
//! descriptors; the interpreter invokes the closures through a
//! [`CallContext`], which is the only way a function can reach the message.

#![warn(missing_docs)]

pub mod args;
pub mod built_in;
pub mod context;
pub mod descriptor;
pub mod plugin;
pub mod registry;

pub use args::Args;
pub use context::{CallContext, ControlFlags, DirectEffects, MessageEffects};
pub use descriptor::{FunctionDescriptor, ParameterDescriptor};
pub use plugin::FunctionPlugin;
pub use registry::{Function, FunctionRegistry, InvokeFn};
