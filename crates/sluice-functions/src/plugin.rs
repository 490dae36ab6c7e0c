use crate::registry::FunctionRegistry;

/// A bundle of functions contributed to a registry.
///
/// Built-in function groups are plugins too; external crates add functions
/// through this trait and [`FunctionRegistry::register`] only.
pub trait FunctionPlugin: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Register this plugin's functions
    fn register(&self, registry: &mut FunctionRegistry);
}
