use alloc::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    String, Vec,
    ast::Span,
    compiler::{CompiledFunction, ConstantKey, Function, FunctionKey},
    values::Literal,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMetadata {
    pub name: String,
}

impl ProgramMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
        }
    }
}

/// A constant and its initializer, which runs once with a nil argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub key: ConstantKey,
    pub span: Span,
    pub initializer: CompiledFunction,
}

/// What a callable global address refers to.
#[derive(Debug, Clone, Copy)]
pub enum Callable<'p> {
    Native(u32),
    Compiled(&'p CompiledFunction),
}

/// A linked, immutable program image.
///
/// Global address space, in order: `data`, `functions`, `closures`,
/// `constants` (already in evaluation order). Every `GLOBAL` and `ARRAY`
/// operand is an address in that space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub metadata: ProgramMetadata,
    pub data: Vec<Literal>,
    pub functions: Vec<Function>,
    pub closures: Vec<CompiledFunction>,
    pub constants: Vec<Constant>,
    /// Zero-argument bodies run on demand after every constant is ready.
    pub effects: Vec<CompiledFunction>,
    /// Schema names, addressed by `DES`/`SER` operands.
    pub schemas: Vec<String>,
    pub(crate) symbols: BTreeMap<FunctionKey, u32>,
    pub(crate) constant_symbols: BTreeMap<ConstantKey, u32>,
}

impl Program {
    pub fn functions_base(&self) -> usize {
        self.data.len()
    }

    pub fn closures_base(&self) -> usize {
        self.functions_base() + self.functions.len()
    }

    pub fn constants_base(&self) -> usize {
        self.closures_base() + self.closures.len()
    }

    /// Size of the global address space.
    pub fn global_count(&self) -> usize {
        self.constants_base() + self.constants.len()
    }

    /// The function or closure body at a global address.
    pub fn callable(&self, address: usize) -> Option<Callable<'_>> {
        if address < self.functions_base() {
            None
        } else if address < self.closures_base() {
            match &self.functions[address - self.functions_base()] {
                Function::Native(id) => Some(Callable::Native(*id)),
                Function::Compiled(function) => Some(Callable::Compiled(function)),
            }
        } else if address < self.constants_base() {
            Some(Callable::Compiled(
                &self.closures[address - self.closures_base()],
            ))
        } else {
            None
        }
    }

    pub fn function_address(&self, module: &str, name: &str, overload: u32) -> Option<usize> {
        self.symbols
            .get(&FunctionKey::new(module, name, overload))
            .map(|&address| address as usize)
    }

    pub fn constant_address(&self, module: &str, name: &str) -> Option<usize> {
        self.constant_symbols
            .get(&ConstantKey::new(module, name))
            .map(|&address| address as usize)
    }

    /// Constant keys in evaluation order.
    pub fn constant_order(&self) -> impl Iterator<Item = &ConstantKey> {
        self.constants.iter().map(|constant| &constant.key)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
