use core::cell::Cell;

use bumpalo::Bump;

use super::{
    ComponentPattern, ConstantDecl, Definition, Expr, ExprKind, FunctionDecl, LetBinding,
    Module, MultiArm, MultiBranch, Pattern, PatternBinding, Span, SwitchBranch,
};
use crate::{String, values::Literal};

/// Arena-backed constructor for resolved expression trees.
///
/// Front ends (and tests) use this instead of spelling out `Expr` literals.
/// Every node gets a distinct one-byte span in allocation order so the
/// source map stays meaningful even without real source text.
pub struct ExprBuilder<'a> {
    arena: &'a Bump,
    next_offset: Cell<usize>,
}

impl<'a> ExprBuilder<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            arena,
            next_offset: Cell::new(0),
        }
    }

    pub fn arena(&self) -> &'a Bump {
        self.arena
    }

    fn next_span(&self) -> Span {
        let start = self.next_offset.get();
        self.next_offset.set(start + 1);
        Span::new(start, start + 1)
    }

    pub fn node(&self, kind: ExprKind<'a>) -> &'a Expr<'a> {
        let span = self.next_span();
        self.arena.alloc(Expr { span, kind })
    }

    pub fn literal(&self, literal: Literal) -> &'a Expr<'a> {
        self.node(ExprKind::Literal(literal))
    }

    pub fn nil(&self) -> &'a Expr<'a> {
        self.literal(Literal::Nil)
    }

    pub fn int(&self, value: i64) -> &'a Expr<'a> {
        self.literal(Literal::Int(value))
    }

    pub fn float(&self, value: f64) -> &'a Expr<'a> {
        self.literal(Literal::Float(value))
    }

    pub fn str(&self, value: &str) -> &'a Expr<'a> {
        self.literal(Literal::Str(String::from(value)))
    }

    /// `true`/`false` are the nullary variants 1 and 0.
    pub fn bool(&self, value: bool) -> &'a Expr<'a> {
        let payload = self.nil();
        self.variant(value as u8, payload)
    }

    pub fn local(&self, name: &'a str) -> &'a Expr<'a> {
        self.node(ExprKind::Local(name))
    }

    pub fn global(&self, module: &'a str, name: &'a str) -> &'a Expr<'a> {
        self.global_overload(module, name, 0)
    }

    pub fn global_overload(&self, module: &'a str, name: &'a str, overload: u32) -> &'a Expr<'a> {
        self.node(ExprKind::Global {
            module,
            name,
            overload,
        })
    }

    pub fn constant(&self, module: &'a str, name: &'a str) -> &'a Expr<'a> {
        self.node(ExprKind::Constant { module, name })
    }

    pub fn array(&self, elements: &[&'a Expr<'a>]) -> &'a Expr<'a> {
        self.node(ExprKind::Array(self.arena.alloc_slice_copy(elements)))
    }

    pub fn tuple(&self, elements: &[&'a Expr<'a>]) -> &'a Expr<'a> {
        self.node(ExprKind::Tuple(self.arena.alloc_slice_copy(elements)))
    }

    pub fn field(&self, value: &'a Expr<'a>, index: u8) -> &'a Expr<'a> {
        self.node(ExprKind::Field { value, index })
    }

    pub fn update(&self, value: &'a Expr<'a>, index: u8, new_value: &'a Expr<'a>) -> &'a Expr<'a> {
        self.node(ExprKind::Update {
            value,
            index,
            new_value,
        })
    }

    pub fn variant(&self, tag: u8, payload: &'a Expr<'a>) -> &'a Expr<'a> {
        self.node(ExprKind::Variant { tag, payload })
    }

    pub fn lambda(&self, param: &'a str, body: &'a Expr<'a>) -> &'a Expr<'a> {
        self.node(ExprKind::Lambda { param, body })
    }

    pub fn call(&self, function: &'a Expr<'a>, argument: &'a Expr<'a>) -> &'a Expr<'a> {
        self.node(ExprKind::Call { function, argument })
    }

    pub fn block(&self, bindings: &[LetBinding<'a>], body: &'a Expr<'a>) -> &'a Expr<'a> {
        self.node(ExprKind::Block {
            bindings: self.arena.alloc_slice_clone(bindings),
            body,
        })
    }

    pub fn let_(&self, name: &'a str, value: &'a Expr<'a>) -> LetBinding<'a> {
        LetBinding {
            name,
            value,
            recursive: false,
            span: self.next_span(),
        }
    }

    pub fn let_rec(&self, name: &'a str, value: &'a Expr<'a>) -> LetBinding<'a> {
        LetBinding {
            recursive: true,
            ..self.let_(name, value)
        }
    }

    pub fn switch(&self, scrutinee: &'a Expr<'a>, branches: &[SwitchBranch<'a>]) -> &'a Expr<'a> {
        self.node(ExprKind::Switch {
            scrutinee,
            branches: self.arena.alloc_slice_clone(branches),
        })
    }

    pub fn case(&self, tag: u8, binding: PatternBinding<'a>, body: &'a Expr<'a>) -> SwitchBranch<'a> {
        SwitchBranch {
            pattern: Pattern::Variant { tag, binding },
            body,
            span: self.next_span(),
        }
    }

    pub fn default_case(&self, binding: PatternBinding<'a>, body: &'a Expr<'a>) -> SwitchBranch<'a> {
        SwitchBranch {
            pattern: Pattern::Default { binding },
            body,
            span: self.next_span(),
        }
    }

    pub fn fields(&self, names: &[&'a str]) -> PatternBinding<'a> {
        PatternBinding::Fields(self.arena.alloc_slice_copy(names))
    }

    pub fn multi_switch(
        &self,
        scrutinees: &[&'a Expr<'a>],
        branches: &[MultiBranch<'a>],
    ) -> &'a Expr<'a> {
        self.node(ExprKind::MultiSwitch {
            scrutinees: self.arena.alloc_slice_copy(scrutinees),
            branches: self.arena.alloc_slice_clone(branches),
        })
    }

    pub fn multi_case(
        &self,
        components: &[ComponentPattern<'a>],
        body: &'a Expr<'a>,
    ) -> MultiBranch<'a> {
        MultiBranch {
            arm: MultiArm::Match(self.arena.alloc_slice_copy(components)),
            body,
            span: self.next_span(),
        }
    }

    pub fn multi_default(&self, body: &'a Expr<'a>) -> MultiBranch<'a> {
        MultiBranch {
            arm: MultiArm::Default,
            body,
            span: self.next_span(),
        }
    }

    pub fn decode(&self, schema: u32, value: &'a Expr<'a>) -> &'a Expr<'a> {
        self.node(ExprKind::Decode { schema, value })
    }

    pub fn encode(&self, schema: u32, value: &'a Expr<'a>) -> &'a Expr<'a> {
        self.node(ExprKind::Encode { schema, value })
    }

    pub fn span(&self) -> Span {
        self.next_span()
    }

    pub fn function(&self, name: &'a str, definition: &'a Expr<'a>) -> FunctionDecl<'a> {
        FunctionDecl {
            name,
            span: self.next_span(),
            definition: Definition::Expr(definition),
        }
    }

    pub fn native_function(&self, name: &'a str, external: &'a str) -> FunctionDecl<'a> {
        FunctionDecl {
            name,
            span: self.next_span(),
            definition: Definition::Native(external),
        }
    }

    pub fn constant_decl(&self, name: &'a str, value: &'a Expr<'a>) -> ConstantDecl<'a> {
        ConstantDecl {
            name,
            span: self.next_span(),
            definition: Definition::Expr(value),
        }
    }

    pub fn native_constant(&self, name: &'a str, external: &'a str) -> ConstantDecl<'a> {
        ConstantDecl {
            name,
            span: self.next_span(),
            definition: Definition::Native(external),
        }
    }

    pub fn module(
        &self,
        name: &'a str,
        imports: &[&'a str],
        functions: &[FunctionDecl<'a>],
        constants: &[ConstantDecl<'a>],
        effects: &[&'a Expr<'a>],
    ) -> &'a Module<'a> {
        self.arena.alloc(Module {
            name,
            imports: self.arena.alloc_slice_copy(imports),
            functions: self.arena.alloc_slice_clone(functions),
            constants: self.arena.alloc_slice_clone(constants),
            effects: self.arena.alloc_slice_copy(effects),
        })
    }
}
