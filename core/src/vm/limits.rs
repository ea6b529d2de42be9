//! Addressing ceilings of the bytecode format.
//!
//! Every operand is range-checked when an instruction is built; exceeding a
//! ceiling means the program cannot be encoded at all.

use core::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    /// Global slot addresses (24-bit).
    Globals,
    /// Frame-relative local offsets (16-bit).
    Locals,
    /// Jump destinations within one function body (16-bit).
    JumpTarget,
    /// Product and sum arity (8-bit).
    Arity,
    /// Array literal length (24-bit).
    ArraySize,
    /// Values captured by one closure (8-bit).
    Captures,
}

impl Limit {
    /// Number of distinct values the operand can hold.
    pub const fn capacity(self) -> usize {
        match self {
            Limit::Globals | Limit::ArraySize => 1 << 24,
            Limit::Locals | Limit::JumpTarget => 1 << 16,
            Limit::Arity | Limit::Captures => 1 << 8,
        }
    }

    /// Returns `value` as an operand, or the error describing the overflow.
    pub fn check(self, value: usize) -> Result<u32, LimitExceeded> {
        if value < self.capacity() {
            Ok(value as u32)
        } else {
            Err(LimitExceeded { limit: self, value })
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Limit::Globals => "global slots",
            Limit::Locals => "local slots",
            Limit::JumpTarget => "jump targets",
            Limit::Arity => "product/sum components",
            Limit::ArraySize => "array literal elements",
            Limit::Captures => "captured values",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too many {limit}: {value} does not fit below {}", .limit.capacity())]
pub struct LimitExceeded {
    pub limit: Limit,
    pub value: usize,
}
