//! Capabilities handed to functions while they run.
//!
//! Functions never hold a mutable message directly. Every mutation goes
//! through [`CallContext`], which forwards it to the [`MessageEffects`]
//! implementation supplied by the caller. Production uses [`DirectEffects`];
//! the simulator swaps in a recording sandbox.

use sluice_types::{Message, Value};
use tracing::info;

/// Externally supplied message capabilities used by effecting functions
pub trait MessageEffects: Send + Sync {
    /// Set a field on the message
    fn set_field(&self, message: &mut Message, name: &str, value: Value) {
        message.set_field(name, value);
    }

    /// Remove a field from the message
    fn remove_field(&self, message: &mut Message, name: &str) {
        message.remove_field(name);
    }

    /// Route the message to a stream
    fn route_to_stream(&self, message: &mut Message, stream_id: &str);

    /// Remove the message from a stream
    fn remove_from_stream(&self, message: &mut Message, stream_id: &str);

    /// Mark the message as dropped
    fn drop_message(&self, message: &mut Message) {
        message.set_dropped(true);
    }

    /// Emit a debug value
    fn debug(&self, message: &Message, value: &Value);
}

/// In-memory effects: mutates the message and logs debug values
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectEffects;

impl MessageEffects for DirectEffects {
    fn route_to_stream(&self, message: &mut Message, stream_id: &str) {
        message.add_stream(stream_id);
    }

    fn remove_from_stream(&self, message: &mut Message, stream_id: &str) {
        message.remove_stream(stream_id);
    }

    fn debug(&self, message: &Message, value: &Value) {
        info!(message_id = %message.id(), value = %value, "pipeline debug");
    }
}

/// Control flags raised by effecting functions during one rule evaluation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlFlags {
    drop_message: bool,
    stop_processing: bool,
}

impl ControlFlags {
    /// `drop_message()` was called
    #[must_use]
    pub const fn drop_message(&self) -> bool {
        self.drop_message
    }

    /// `stop_processing()` was called
    #[must_use]
    pub const fn stop_processing(&self) -> bool {
        self.stop_processing
    }
}

/// Per-call view of the message being processed
pub struct CallContext<'a> {
    message: &'a mut Message,
    effects: &'a dyn MessageEffects,
    flags: &'a mut ControlFlags,
}

impl<'a> CallContext<'a> {
    /// Create a context over a message, its effect capabilities and the rule's flags
    pub fn new(
        message: &'a mut Message,
        effects: &'a dyn MessageEffects,
        flags: &'a mut ControlFlags,
    ) -> Self {
        Self { message, effects, flags }
    }

    /// Read-only access to the message
    #[must_use]
    pub fn message(&self) -> &Message {
        &*self.message
    }

    /// Set a field
    pub fn set_field(&mut self, name: &str, value: Value) {
        self.effects.set_field(self.message, name, value);
    }

    /// Remove a field
    pub fn remove_field(&mut self, name: &str) {
        self.effects.remove_field(self.message, name);
    }

    /// Rename a field, returning false when it is absent
    pub fn rename_field(&mut self, old: &str, new: &str) -> bool {
        let Some(value) = self.message.field(old).cloned() else {
            return false;
        };
        if old != new {
            self.effects.remove_field(self.message, old);
            self.effects.set_field(self.message, new, value);
        }
        true
    }

    /// Route to a stream
    pub fn route_to_stream(&mut self, stream_id: &str) {
        self.effects.route_to_stream(self.message, stream_id);
    }

    /// Remove from a stream
    pub fn remove_from_stream(&mut self, stream_id: &str) {
        self.effects.remove_from_stream(self.message, stream_id);
    }

    /// Drop the message and raise the drop flag
    pub fn drop_message(&mut self) {
        self.effects.drop_message(self.message);
        self.flags.drop_message = true;
    }

    /// Raise the stop flag for the current pipeline
    pub fn stop_processing(&mut self) {
        self.flags.stop_processing = true;
    }

    /// Emit a debug value
    pub fn debug(&self, value: &Value) {
        self.effects.debug(&*self.message, value);
    }
}
