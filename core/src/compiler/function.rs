//! Compiled bodies and the references they leave for the linker.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{String, Vec, ast::Span, format, values::Literal, vm::Code};

/// Frame geometry of a compiled body: `[context][reserved][argument]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseSize {
    /// Values injected from the closure (captures, then the closure itself
    /// when it is self-recursive).
    pub context: u32,
    /// Local binding slots beyond the argument.
    pub reserved: u32,
}

impl BaseSize {
    /// Offset of the argument slot.
    pub fn argument(&self) -> usize {
        (self.context + self.reserved) as usize
    }

    /// Total slots a frame occupies, argument included.
    pub fn frame_size(&self) -> usize {
        self.argument() + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncInfo {
    pub module: String,
    pub name: String,
    /// Declaration point.
    pub span: Span,
}

impl FuncInfo {
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub code: Code,
    pub size: BaseSize,
    pub info: FuncInfo,
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "fn {} (context: {}, reserved: {})",
            self.info.display_name(),
            self.size.context,
            self.size.reserved
        )?;
        write!(f, "{:?}", self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Function {
    /// Index into the native registry.
    Native(u32),
    Compiled(CompiledFunction),
}

impl Function {
    pub fn as_compiled(&self) -> Option<&CompiledFunction> {
        match self {
            Function::Compiled(function) => Some(function),
            Function::Native(_) => None,
        }
    }
}

/// Identifies a top-level function across modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionKey {
    pub module: String,
    pub name: String,
    pub overload: u32,
}

impl FunctionKey {
    pub fn new(module: &str, name: &str, overload: u32) -> Self {
        Self {
            module: String::from(module),
            name: String::from(name),
            overload,
        }
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.overload == 0 {
            write!(f, "{}.{}", self.module, self.name)
        } else {
            write!(f, "{}.{}#{}", self.module, self.name, self.overload)
        }
    }
}

/// Identifies a top-level constant across modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstantKey {
    pub module: String,
    pub name: String,
}

impl ConstantKey {
    pub fn new(module: &str, name: &str) -> Self {
        Self {
            module: String::from(module),
            name: String::from(name),
        }
    }
}

impl fmt::Display for ConstantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// A global reference made by one body, still unresolved.
///
/// `GLOBAL`/`ARRAY` operands in that body index its list of these.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalRef {
    Data(Literal),
    Function(FunctionKey),
    Constant(ConstantKey),
    /// A nested lambda with its own references.
    Closure {
        function: CompiledFunction,
        refs: Vec<GlobalRef>,
    },
}

/// A `GlobalRef` after pooling: inline data and closures are replaced by
/// their index in the compilation-wide pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dependency {
    Function(FunctionKey),
    Constant(ConstantKey),
    Data(u32),
    Closure(u32),
}

/// A function with its dependencies, waiting to be linked.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncNode {
    pub function: Function,
    pub deps: Vec<Dependency>,
}

/// A compiled constant initializer or effect body with its dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyNode {
    pub function: CompiledFunction,
    pub deps: Vec<Dependency>,
}
