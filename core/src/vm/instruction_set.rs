//! Tessel VM Instructions - Fixed 32-bit Format
//!
//! This module defines the instruction set shared by the compiler and the
//! stack-based virtual machine.
//!
//! # Instruction Format
//!
//! **ALL instructions are exactly 32 bits (4 bytes)**:
//! ```text
//! ┌────────────┬────────────┬─────────────────────────┐
//! │   OpCode   │    Arg0    │          Arg1           │
//! │  (8 bits)  │  (8 bits)  │        (16 bits)        │
//! └────────────┴────────────┴─────────────────────────┘
//! ```
//!
//! Operand widths depend on the opcode:
//! - 8-bit operands (tags, component indexes, flags) live in `Arg0`.
//! - 16-bit operands (locals, jump destinations) live in `Arg1`.
//! - 24-bit operands (global addresses, schema indexes) span both:
//!   `Arg0 << 16 | Arg1`.
//! - `JIF` uses both independently: tag in `Arg0`, destination in `Arg1`.
//!
//! Jump destinations are absolute instruction indexes within the function
//! body; a destination equal to the body length means "return".
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`

use core::fmt;

use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;

use super::limits::{Limit, LimitExceeded};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    /// No operation. Marks the join point after a switch.
    Nop = 0x00,
    /// `[...] -> [..., nil]`
    Nil = 0x01,
    /// `[..., a] -> [...]`
    Pop = 0x02,
    /// Push global slot (24-bit address).
    Global = 0x03,
    /// Push a copy of local slot (16-bit offset from the frame base).
    Load = 0x04,
    /// `[..., v] -> [...]`, writing `v` to local slot.
    Store = 0x05,
    /// `[..., payload] -> [..., sum]` with tag in Arg0.
    Sum = 0x06,
    /// If the top sum has tag Arg0: replace it by its payload and jump to Arg1.
    Jif = 0x07,
    /// Unconditional jump to Arg1.
    Jmp = 0x08,
    /// `[..., a1 .. an] -> [..., (a1, .., an)]`
    Prod = 0x09,
    /// `[..., t] -> [..., t, t.i]`
    Get = 0x0A,
    /// `[..., t] -> [..., t.i]`
    PopGet = 0x0B,
    /// `[..., t, v] -> [..., t']` where `t'` is `t` with component i replaced.
    Set = 0x0C,
    /// `[..., f, (c1, .., ck)] -> [..., closure]`; Arg0 is the recursive flag.
    Ctx = 0x0D,
    /// `[..., arg, f] -> [..., f(arg)]`
    Call = 0x0E,
    /// Push an empty array; the operand addresses its integer size hint.
    Array = 0x0F,
    /// `[..., array, v] -> [..., array ++ [v]]`
    Append = 0x10,
    /// Reset the match buffer.
    Ms = 0x11,
    /// Require the next component to carry tag Arg0.
    Msi = 0x12,
    /// Accept any value for the next component.
    Msd = 0x13,
    /// If the buffer matches the tuple on top, rebuild it and jump to Arg1.
    Msj = 0x14,
    /// Decode the top value with the external schema at the 24-bit operand.
    Des = 0x15,
    /// Encode the top value with the external schema at the 24-bit operand.
    Ser = 0x16,
}

impl OpCode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::Nil => "NIL",
            OpCode::Pop => "POP",
            OpCode::Global => "GLOBAL",
            OpCode::Load => "LOAD",
            OpCode::Store => "STORE",
            OpCode::Sum => "SUM",
            OpCode::Jif => "JIF",
            OpCode::Jmp => "JMP",
            OpCode::Prod => "PROD",
            OpCode::Get => "GET",
            OpCode::PopGet => "POPGET",
            OpCode::Set => "SET",
            OpCode::Ctx => "CTX",
            OpCode::Call => "CALL",
            OpCode::Array => "ARRAY",
            OpCode::Append => "APPEND",
            OpCode::Ms => "MS",
            OpCode::Msi => "MSI",
            OpCode::Msd => "MSD",
            OpCode::Msj => "MSJ",
            OpCode::Des => "DES",
            OpCode::Ser => "SER",
        }
    }
}

/// A single VM instruction (exactly 32 bits).
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    op: OpCode,
    arg0: u8,
    arg1: u16,
}

assert_eq_size!(Instruction, [u8; 4]);

impl Instruction {
    const fn new(op: OpCode, arg0: u8, arg1: u16) -> Self {
        Self { op, arg0, arg1 }
    }

    fn wide_operand(op: OpCode, limit: Limit, value: usize) -> Result<Self, LimitExceeded> {
        let value = limit.check(value)?;
        Ok(Self::new(op, (value >> 16) as u8, value as u16))
    }

    fn local_operand(op: OpCode, offset: usize) -> Result<Self, LimitExceeded> {
        Ok(Self::new(op, 0, Limit::Locals.check(offset)? as u16))
    }

    fn jump_operand(op: OpCode, tag: u8, dest: usize) -> Result<Self, LimitExceeded> {
        Ok(Self::new(op, tag, Limit::JumpTarget.check(dest)? as u16))
    }

    pub const fn nop() -> Self {
        Self::new(OpCode::Nop, 0, 0)
    }

    pub const fn nil() -> Self {
        Self::new(OpCode::Nil, 0, 0)
    }

    pub const fn pop() -> Self {
        Self::new(OpCode::Pop, 0, 0)
    }

    pub fn global(address: usize) -> Result<Self, LimitExceeded> {
        Self::wide_operand(OpCode::Global, Limit::Globals, address)
    }

    pub fn load(offset: usize) -> Result<Self, LimitExceeded> {
        Self::local_operand(OpCode::Load, offset)
    }

    pub fn store(offset: usize) -> Result<Self, LimitExceeded> {
        Self::local_operand(OpCode::Store, offset)
    }

    pub const fn sum(tag: u8) -> Self {
        Self::new(OpCode::Sum, tag, 0)
    }

    pub fn jif(tag: u8, dest: usize) -> Result<Self, LimitExceeded> {
        Self::jump_operand(OpCode::Jif, tag, dest)
    }

    pub fn jmp(dest: usize) -> Result<Self, LimitExceeded> {
        Self::jump_operand(OpCode::Jmp, 0, dest)
    }

    pub fn prod(count: usize) -> Result<Self, LimitExceeded> {
        Ok(Self::new(OpCode::Prod, Limit::Arity.check(count)? as u8, 0))
    }

    pub const fn get(index: u8) -> Self {
        Self::new(OpCode::Get, index, 0)
    }

    pub const fn pop_get(index: u8) -> Self {
        Self::new(OpCode::PopGet, index, 0)
    }

    pub const fn set(index: u8) -> Self {
        Self::new(OpCode::Set, index, 0)
    }

    pub const fn ctx(recursive: bool) -> Self {
        Self::new(OpCode::Ctx, recursive as u8, 0)
    }

    pub const fn call() -> Self {
        Self::new(OpCode::Call, 0, 0)
    }

    /// `index` starts out as a dependency index and is relocated like `GLOBAL`.
    pub fn array(index: usize) -> Result<Self, LimitExceeded> {
        Self::wide_operand(OpCode::Array, Limit::Globals, index)
    }

    /// `last` marks the element that closes the literal.
    pub const fn append(last: bool) -> Self {
        Self::new(OpCode::Append, last as u8, 0)
    }

    pub const fn ms() -> Self {
        Self::new(OpCode::Ms, 0, 0)
    }

    pub const fn msi(tag: u8) -> Self {
        Self::new(OpCode::Msi, tag, 0)
    }

    pub const fn msd() -> Self {
        Self::new(OpCode::Msd, 0, 0)
    }

    pub fn msj(dest: usize) -> Result<Self, LimitExceeded> {
        Self::jump_operand(OpCode::Msj, 0, dest)
    }

    pub fn des(schema: usize) -> Result<Self, LimitExceeded> {
        Self::wide_operand(OpCode::Des, Limit::Globals, schema)
    }

    pub fn ser(schema: usize) -> Result<Self, LimitExceeded> {
        Self::wide_operand(OpCode::Ser, Limit::Globals, schema)
    }

    #[inline]
    pub fn op(&self) -> OpCode {
        self.op
    }

    #[inline]
    pub fn arg0(&self) -> u8 {
        self.arg0
    }

    #[inline]
    pub fn arg1(&self) -> u16 {
        self.arg1
    }

    /// The 24-bit operand of `GLOBAL`, `ARRAY`, `DES` and `SER`.
    #[inline]
    pub fn wide(&self) -> usize {
        ((self.arg0 as usize) << 16) | self.arg1 as usize
    }

    pub fn with_wide(self, value: usize) -> Result<Self, LimitExceeded> {
        Self::wide_operand(self.op, Limit::Globals, value)
    }

    /// Local offset of `LOAD`/`STORE`.
    #[inline]
    pub fn offset(&self) -> usize {
        self.arg1 as usize
    }

    pub fn with_offset(self, offset: usize) -> Result<Self, LimitExceeded> {
        Self::local_operand(self.op, offset)
    }

    /// Whether this `APPEND` adds the last element of its literal.
    #[inline]
    pub fn closes_array(&self) -> bool {
        self.arg0 != 0
    }

    #[inline]
    pub fn is_jump(&self) -> bool {
        matches!(self.op, OpCode::Jif | OpCode::Jmp | OpCode::Msj)
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self.op, OpCode::Load | OpCode::Store)
    }

    /// Jump destination; only meaningful when [`is_jump`](Self::is_jump).
    #[inline]
    pub fn dest(&self) -> usize {
        self.arg1 as usize
    }

    pub fn with_dest(self, dest: usize) -> Result<Self, LimitExceeded> {
        Self::jump_operand(self.op, self.arg0, dest)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.op.mnemonic();
        match self.op {
            OpCode::Nop
            | OpCode::Nil
            | OpCode::Pop
            | OpCode::Call
            | OpCode::Ms
            | OpCode::Msd => write!(f, "{}", name),
            OpCode::Global | OpCode::Array | OpCode::Des | OpCode::Ser => {
                write!(f, "{} {}", name, self.wide())
            }
            OpCode::Load | OpCode::Store => write!(f, "{} {}", name, self.offset()),
            OpCode::Append if self.closes_array() => write!(f, "{} last", name),
            OpCode::Append => write!(f, "{}", name),
            OpCode::Sum
            | OpCode::Prod
            | OpCode::Get
            | OpCode::PopGet
            | OpCode::Set
            | OpCode::Ctx
            | OpCode::Msi => write!(f, "{} {}", name, self.arg0),
            OpCode::Jif => write!(f, "{} {} -> {}", name, self.arg0, self.dest()),
            OpCode::Jmp | OpCode::Msj => write!(f, "{} -> {}", name, self.dest()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_operand_spans_both_arguments() {
        let inst = Instruction::global(0x12_3456).unwrap();
        assert_eq!(inst.arg0(), 0x12);
        assert_eq!(inst.arg1(), 0x3456);
        assert_eq!(inst.wide(), 0x12_3456);
    }

    #[test]
    fn operands_are_range_checked() {
        assert!(Instruction::global(1 << 24).is_err());
        assert!(Instruction::load(1 << 16).is_err());
        assert!(Instruction::jmp(1 << 16).is_err());
        assert!(Instruction::prod(256).is_err());
        assert!(Instruction::prod(255).is_ok());
    }

    #[test]
    fn with_dest_keeps_tag() {
        let inst = Instruction::jif(3, 10).unwrap().with_dest(42).unwrap();
        assert_eq!(inst.op(), OpCode::Jif);
        assert_eq!(inst.arg0(), 3);
        assert_eq!(inst.dest(), 42);
    }

    #[test]
    fn debug_format() {
        assert_eq!(
            alloc::format!("{:?}", Instruction::jif(1, 7).unwrap()),
            "JIF 1 -> 7"
        );
        assert_eq!(alloc::format!("{:?}", Instruction::get(2)), "GET 2");
        assert_eq!(alloc::format!("{:?}", Instruction::call()), "CALL");
        assert_eq!(alloc::format!("{:?}", Instruction::append(true)), "APPEND last");
    }
}
