//! Host-provided functions and constants.
//!
//! Modules refer to natives by external name; the compiler resolves those
//! names to registry ids once, and the VM dispatches on the id. The registry
//! is built explicitly and passed to both, so there is no load-order state.

use hashbrown::HashMap;

use crate::{
    String, Vec,
    values::{Literal, Value},
    vm::{ExecutionError, Vm},
};

/// Signature of a native function.
///
/// Natives get the running VM so they can allocate in its arena and call
/// back into compiled code with [`Vm::call`].
pub type NativeFn =
    for<'p, 'a> fn(&mut Vm<'p, 'a>, Value<'a>) -> Result<Value<'a>, ExecutionError>;

#[derive(Clone)]
struct NativeFunction {
    name: String,
    function: NativeFn,
}

/// Immutable name → id table, shared by compilation and execution.
#[derive(Clone, Default)]
pub struct NativeRegistry {
    functions: Vec<NativeFunction>,
    function_ids: HashMap<String, u32>,
    constants: HashMap<String, Literal>,
}

impl NativeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn function_id(&self, name: &str) -> Option<u32> {
        self.function_ids.get(name).copied()
    }

    pub fn function(&self, id: u32) -> Option<NativeFn> {
        self.functions.get(id as usize).map(|native| native.function)
    }

    pub fn function_name(&self, id: u32) -> Option<&str> {
        self.functions
            .get(id as usize)
            .map(|native| native.name.as_str())
    }

    pub fn constant(&self, name: &str) -> Option<&Literal> {
        self.constants.get(name)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

impl core::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NativeRegistry")
            .field(
                "functions",
                &self
                    .functions
                    .iter()
                    .map(|native| native.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("constants", &self.constants)
            .finish()
    }
}

/// Collects natives before freezing them into a [`NativeRegistry`].
///
/// ```
/// use tessel_core::natives::NativeRegistry;
/// use tessel_core::values::{Literal, Value};
///
/// let registry = NativeRegistry::builder()
///     .function("id", |_vm, value| Ok(value))
///     .constant("answer", Literal::Int(42))
///     .build();
/// assert_eq!(registry.function_id("id"), Some(0));
/// assert_eq!(registry.constant("answer"), Some(&Literal::Int(42)));
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    registry: NativeRegistry,
}

impl RegistryBuilder {
    /// Registers a function. Re-registering a name replaces the previous
    /// entry without changing its id.
    pub fn function(mut self, name: &str, function: NativeFn) -> Self {
        self.register_function(name, function);
        self
    }

    pub fn constant(mut self, name: &str, value: Literal) -> Self {
        self.register_constant(name, value);
        self
    }

    pub fn register_function(&mut self, name: &str, function: NativeFn) {
        let registry = &mut self.registry;
        match registry.function_ids.get(name) {
            Some(&id) => registry.functions[id as usize].function = function,
            None => {
                let id = registry.functions.len() as u32;
                registry.functions.push(NativeFunction {
                    name: String::from(name),
                    function,
                });
                registry.function_ids.insert(String::from(name), id);
            }
        }
    }

    pub fn register_constant(&mut self, name: &str, value: Literal) {
        self.registry.constants.insert(String::from(name), value);
    }

    pub fn build(self) -> NativeRegistry {
        self.registry
    }
}
