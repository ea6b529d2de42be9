//! Tessel Standard Library
//!
//! Native functions and constants every program can bind to:
//! - `int.*`, `float.*`: arithmetic and comparisons, plus `float.pi`/`float.e`
//! - `string.*`: length and concatenation
//! - `array.*`: length, indexing, `map` and `fold` (which call back into
//!   compiled code)
//!
//! Binary operations take their operands as a 2-tuple, since every callable
//! takes exactly one argument. Comparisons return the booleans `#1`/`#0`.

use crate::{
    format,
    natives::{NativeRegistry, RegistryBuilder},
    values::Value,
    vm::ExecutionError,
};

pub mod array;
pub mod math;
pub mod string;


/// Register every standard library package.
///
/// # Example
///
/// ```
/// use tessel_core::api::{Engine, EngineOptions};
///
/// let engine = Engine::new(EngineOptions::default(), tessel_core::stdlib::register);
/// assert!(engine.registry().function_id("int.add").is_some());
/// ```
pub fn register(builder: &mut RegistryBuilder) {
    math::register(builder);
    string::register(builder);
    array::register(builder);
}

/// A registry holding just the standard library.
pub fn registry() -> NativeRegistry {
    let mut builder = NativeRegistry::builder();
    register(&mut builder);
    builder.build()
}

/// Splits the 2-tuple argument of a binary native.
pub(crate) fn pair<'a>(
    name: &str,
    argument: Value<'a>,
) -> Result<(Value<'a>, Value<'a>), ExecutionError> {
    match argument.as_tuple() {
        Some([left, right]) => Ok((*left, *right)),
        _ => Err(ExecutionError::native(
            name,
            format!("expected a pair, found {}", argument.kind()),
        )),
    }
}

pub(crate) fn expect<'a, T>(
    name: &str,
    what: &str,
    value: Value<'a>,
    get: impl FnOnce(&Value<'a>) -> Option<T>,
) -> Result<T, ExecutionError> {
    get(&value).ok_or_else(|| {
        ExecutionError::native(name, format!("expected {}, found {}", what, value.kind()))
    })
}
