use hashbrown::HashMap;

use super::{Expr, Span};

/// One compilation unit: top-level functions, constants and effects.
#[derive(Debug, Clone)]
pub struct Module<'a> {
    pub name: &'a str,
    /// Modules compiled before this one.
    pub imports: &'a [&'a str],
    pub functions: &'a [FunctionDecl<'a>],
    pub constants: &'a [ConstantDecl<'a>],
    /// Effect bodies; each runs with no argument once constants are ready.
    pub effects: &'a [&'a Expr<'a>],
}

/// A function definition. Functions sharing a name are distinguished by
/// their declaration order, which becomes the overload index.
#[derive(Debug, Clone)]
pub struct FunctionDecl<'a> {
    pub name: &'a str,
    pub span: Span,
    pub definition: Definition<'a>,
}

#[derive(Debug, Clone)]
pub struct ConstantDecl<'a> {
    pub name: &'a str,
    pub span: Span,
    pub definition: Definition<'a>,
}

#[derive(Debug, Clone)]
pub enum Definition<'a> {
    /// A lambda for functions; any expression for constants.
    Expr(&'a Expr<'a>),
    /// Provided by the native registry under this external name.
    Native(&'a str),
}

/// All modules reachable from a program, keyed by name.
#[derive(Debug, Default)]
pub struct ModuleIndex<'a> {
    modules: HashMap<&'a str, &'a Module<'a>>,
}

impl<'a> ModuleIndex<'a> {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    pub fn from_modules(modules: &[&'a Module<'a>]) -> Self {
        let mut index = Self::new();
        for module in modules {
            index.insert(module);
        }
        index
    }

    pub fn insert(&mut self, module: &'a Module<'a>) {
        self.modules.insert(module.name, module);
    }

    pub fn get(&self, name: &str) -> Option<&'a Module<'a>> {
        self.modules.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
