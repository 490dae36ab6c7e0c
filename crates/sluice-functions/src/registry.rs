use crate::args::Args;
use crate::context::CallContext;
use crate::descriptor::FunctionDescriptor;
use crate::plugin::FunctionPlugin;
use ahash::AHashMap;
use sluice_types::{EvaluationError, Value};
use std::sync::Arc;
use tracing::debug;

/// Invocation closure of a registered function
pub type InvokeFn =
    dyn Fn(&mut CallContext<'_>, &Args<'_>) -> Result<Value, EvaluationError> + Send + Sync;

/// A descriptor paired with its implementation
pub struct Function {
    descriptor: FunctionDescriptor,
    invoke: Box<InvokeFn>,
}

impl Function {
    /// Static description of the function
    #[must_use]
    pub const fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    /// Function name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Run the function over bound argument values
    ///
    /// # Errors
    ///
    /// Propagates whatever the implementation reports.
    pub fn invoke(&self, ctx: &mut CallContext<'_>, values: &[Value]) -> Result<Value, EvaluationError> {
        (self.invoke)(ctx, &Args::new(&self.descriptor.name, values))
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function").field("descriptor", &self.descriptor).finish_non_exhaustive()
    }
}

/// Catalog of callable functions keyed by name.
///
/// Built once at startup and then shared read-only behind an `Arc`; changing
/// the function set means building a new registry and publishing a new
/// configuration snapshot around it.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: AHashMap<String, Arc<Function>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry").field("functions", &self.names()).finish()
    }
}

impl FunctionRegistry {
    /// Create a new empty function registry
    #[must_use]
    pub fn new() -> Self {
        Self { functions: AHashMap::new() }
    }

    /// Create a function registry with built-in functions
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for plugin in crate::built_in::plugins() {
            registry.install(plugin.as_ref());
        }
        registry
    }

    /// Register a function, replacing any previous function of the same name.
    /// Returns the replaced function.
    pub fn register<F>(&mut self, descriptor: FunctionDescriptor, invoke: F) -> Option<Arc<Function>>
    where
        F: Fn(&mut CallContext<'_>, &Args<'_>) -> Result<Value, EvaluationError> + Send + Sync + 'static,
    {
        let name = descriptor.name.clone();
        let function = Arc::new(Function { descriptor, invoke: Box::new(invoke) });
        let previous = self.functions.insert(name.clone(), function);
        if previous.is_some() {
            debug!(function = %name, "replaced registered function");
        }
        previous
    }

    /// Let a plugin register its functions
    pub fn install(&mut self, plugin: &dyn FunctionPlugin) {
        let before = self.functions.len();
        plugin.register(self);
        debug!(
            plugin = plugin.name(),
            added = self.functions.len().saturating_sub(before),
            "installed function plugin"
        );
    }

    /// Look up a function by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Function>> {
        self.functions.get(name)
    }

    /// Descriptor of a function by name
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(name).map(|f| f.descriptor())
    }

    /// Whether a function is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names in sorted order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered functions
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
