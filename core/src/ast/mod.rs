//! Resolved expression tree handed over by the front end.
//!
//! Everything here has already been parsed, name-resolved and type-checked:
//! field accesses carry their component index, variant constructors and
//! patterns carry their tag, and references to other top-level definitions
//! name the module they live in. The compiler trusts these invariants.

mod builder;
mod module;
mod span;

pub use builder::ExprBuilder;
pub use module::{ConstantDecl, Definition, FunctionDecl, Module, ModuleIndex};
pub use span::Span;

use crate::values::Literal;

/// Name bound by patterns and lets that is never reported as unused.
pub const IGNORE: &str = "_";

#[derive(Debug, Clone, PartialEq)]
pub struct Expr<'a> {
    pub span: Span,
    pub kind: ExprKind<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind<'a> {
    Literal(Literal),
    /// A let-bound name, lambda parameter or pattern variable.
    Local(&'a str),
    /// A top-level function, possibly in another module.
    Global {
        module: &'a str,
        name: &'a str,
        overload: u32,
    },
    /// A top-level constant, possibly in another module.
    Constant {
        module: &'a str,
        name: &'a str,
    },
    Array(&'a [&'a Expr<'a>]),
    /// Tuples and records; record fields are already ordered.
    Tuple(&'a [&'a Expr<'a>]),
    Field {
        value: &'a Expr<'a>,
        index: u8,
    },
    /// Functional update: a copy of `value` with component `index` replaced.
    Update {
        value: &'a Expr<'a>,
        index: u8,
        new_value: &'a Expr<'a>,
    },
    Variant {
        tag: u8,
        payload: &'a Expr<'a>,
    },
    Switch {
        scrutinee: &'a Expr<'a>,
        branches: &'a [SwitchBranch<'a>],
    },
    MultiSwitch {
        scrutinees: &'a [&'a Expr<'a>],
        branches: &'a [MultiBranch<'a>],
    },
    Lambda {
        param: &'a str,
        body: &'a Expr<'a>,
    },
    Block {
        bindings: &'a [LetBinding<'a>],
        body: &'a Expr<'a>,
    },
    Call {
        function: &'a Expr<'a>,
        argument: &'a Expr<'a>,
    },
    /// Decode `value` with the external schema at `schema`.
    Decode {
        schema: u32,
        value: &'a Expr<'a>,
    },
    /// Encode `value` with the external schema at `schema`.
    Encode {
        schema: u32,
        value: &'a Expr<'a>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding<'a> {
    pub name: &'a str,
    pub value: &'a Expr<'a>,
    /// The binding is visible inside its own value (`let rec`).
    pub recursive: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchBranch<'a> {
    pub pattern: Pattern<'a>,
    pub body: &'a Expr<'a>,
    pub span: Span,
}

/// Single-argument match pattern. At most one `Default`, always last.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern<'a> {
    Variant {
        tag: u8,
        binding: PatternBinding<'a>,
    },
    Default {
        binding: PatternBinding<'a>,
    },
}

impl<'a> Pattern<'a> {
    pub fn tag(&self) -> Option<u8> {
        match self {
            Pattern::Variant { tag, .. } => Some(*tag),
            Pattern::Default { .. } => None,
        }
    }

    pub fn binding(&self) -> &PatternBinding<'a> {
        match self {
            Pattern::Variant { binding, .. } | Pattern::Default { binding } => binding,
        }
    }
}

/// What a matched arm binds from the value it matched.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternBinding<'a> {
    Ignore,
    /// The whole payload (or, for a default arm, the whole scrutinee).
    Whole(&'a str),
    /// Components of a tuple payload; `_` skips a component.
    Fields(&'a [&'a str]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiBranch<'a> {
    pub arm: MultiArm<'a>,
    pub body: &'a Expr<'a>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MultiArm<'a> {
    /// One entry per scrutinee.
    Match(&'a [ComponentPattern<'a>]),
    Default,
}

/// One component of a joint match: `tag` of `None` accepts any value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentPattern<'a> {
    pub tag: Option<u8>,
    pub binding: Option<&'a str>,
}
