//! Bytecode format and the stack machine that runs it.

mod code;
mod codec;
mod context;
mod error;
mod instruction_set;
mod limits;
mod runtime;
mod stack;

pub use code::Code;
pub use codec::SchemaCodec;
pub use error::{ExecutionError, ExecutionErrorKind, TraceFrame};
pub use instruction_set::{Instruction, OpCode};
pub use limits::{Limit, LimitExceeded};
pub use runtime::Vm;
pub use stack::Stack;

#[cfg(test)]
mod runtime_test;
