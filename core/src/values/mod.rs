//! Runtime and compile-time value representations.
//!
//! [`Literal`] is owned, serializable data that the compiler pools and the
//! linker stores in the program image. [`Value`] is what the VM pushes around:
//! a `Copy` handle whose compound parts live in a caller-provided arena.

mod literal;
mod value;

pub use literal::Literal;
pub use value::{Closure, Value};

#[cfg(test)]
mod value_test;
