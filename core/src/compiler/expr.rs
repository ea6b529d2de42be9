//! Lowering of expression nodes into [`Code`].

use super::error::{AtSpan, CompileError};
use super::function::{ConstantKey, FunctionKey, GlobalRef};
use crate::{
    String, Vec,
    api::CompilationOptions,
    ast::{
        ComponentPattern, Expr, ExprKind, IGNORE, LetBinding, MultiArm, MultiBranch,
        PatternBinding, Span, SwitchBranch,
    },
    scope_stack::Scope,
    values::Literal,
    vm::{Code, Instruction, Limit},
};

/// Compiles the expressions of one body (top-level function, constant,
/// effect or lambda).
///
/// Local offsets emitted here are scope positions; they are turned into
/// frame offsets once the body is complete (see `closure.rs`). `GLOBAL`
/// operands index `refs`.
pub(crate) struct ExprCompiler<'c, 'a> {
    pub(super) scope: Scope<'a>,
    pub(super) refs: Vec<GlobalRef>,
    /// Diagnostics from nested lambdas.
    pub(super) errors: Vec<CompileError>,
    pub(super) options: &'c CompilationOptions,
    pub(super) module: &'c str,
    /// Name of the body, used to name the lambdas nested in it.
    pub(super) name: String,
}

impl<'c, 'a> ExprCompiler<'c, 'a> {
    pub fn new(
        scope: Scope<'a>,
        options: &'c CompilationOptions,
        module: &'c str,
        name: String,
    ) -> Self {
        Self {
            scope,
            refs: Vec::new(),
            errors: Vec::new(),
            options,
            module,
            name,
        }
    }

    /// Index of `global` in this body's reference list. Equal data and
    /// named references share an entry; closures never do.
    pub fn global_ref(&mut self, global: GlobalRef) -> usize {
        if !matches!(global, GlobalRef::Closure { .. }) {
            if let Some(index) = self.refs.iter().position(|r| *r == global) {
                return index;
            }
        }
        self.refs.push(global);
        self.refs.len() - 1
    }

    pub fn compile(&mut self, expr: &'a Expr<'a>) -> Result<Code, CompileError> {
        let span = &expr.span;
        let mut code = Code::new();
        match &expr.kind {
            ExprKind::Literal(Literal::Nil) => code.emit(Instruction::nil(), span),
            ExprKind::Literal(literal) => {
                let index = self.global_ref(GlobalRef::Data(literal.clone()));
                code.emit(Instruction::global(index).at(span)?, span);
            }
            ExprKind::Local(name) => {
                let offset = self
                    .scope
                    .lookup(name)
                    .ok_or_else(|| CompileError::UnboundLocal {
                        name: String::from(*name),
                        span: span.clone(),
                    })?;
                code.emit(Instruction::load(offset).at(span)?, span);
            }
            ExprKind::Global {
                module,
                name,
                overload,
            } => {
                let key = FunctionKey::new(module, name, *overload);
                let index = self.global_ref(GlobalRef::Function(key));
                code.emit(Instruction::global(index).at(span)?, span);
            }
            ExprKind::Constant { module, name } => {
                let key = ConstantKey::new(module, name);
                let index = self.global_ref(GlobalRef::Constant(key));
                code.emit(Instruction::global(index).at(span)?, span);
            }
            ExprKind::Array(elements) => {
                let size = Limit::ArraySize.check(elements.len()).at(span)?;
                let hint = self.global_ref(GlobalRef::Data(Literal::Int(size as i64)));
                code.emit(Instruction::array(hint).at(span)?, span);
                for (i, element) in elements.iter().enumerate() {
                    let element_code = self.compile(element)?;
                    code.write(element_code).at(span)?;
                    code.emit(Instruction::append(i + 1 == elements.len()), span);
                }
            }
            ExprKind::Tuple(elements) => {
                for element in elements.iter() {
                    let element_code = self.compile(element)?;
                    code.write(element_code).at(span)?;
                }
                code.emit(Instruction::prod(elements.len()).at(span)?, span);
            }
            ExprKind::Field { value, index } => {
                let value_code = self.compile(value)?;
                code.write(value_code).at(span)?;
                code.emit(Instruction::pop_get(*index), span);
            }
            ExprKind::Update {
                value,
                index,
                new_value,
            } => {
                let value_code = self.compile(value)?;
                code.write(value_code).at(span)?;
                let new_code = self.compile(new_value)?;
                code.write(new_code).at(span)?;
                code.emit(Instruction::set(*index), span);
            }
            ExprKind::Variant { tag, payload } => {
                let payload_code = self.compile(payload)?;
                code.write(payload_code).at(span)?;
                code.emit(Instruction::sum(*tag), span);
            }
            ExprKind::Switch {
                scrutinee,
                branches,
            } => {
                code = self.compile_switch(scrutinee, branches, span)?;
            }
            ExprKind::MultiSwitch {
                scrutinees,
                branches,
            } => {
                code = self.compile_multi_switch(scrutinees, branches, span)?;
            }
            ExprKind::Lambda { param, body } => {
                code = self.compile_lambda(param, body, span, None)?;
            }
            ExprKind::Block { bindings, body } => {
                code = self.compile_block(bindings, body)?;
            }
            ExprKind::Call { function, argument } => {
                let argument_code = self.compile(argument)?;
                code.write(argument_code).at(span)?;
                let function_code = self.compile(function)?;
                code.write(function_code).at(span)?;
                code.emit(Instruction::call(), span);
            }
            ExprKind::Decode { schema, value } => {
                let value_code = self.compile(value)?;
                code.write(value_code).at(span)?;
                code.emit(Instruction::des(*schema as usize).at(span)?, span);
            }
            ExprKind::Encode { schema, value } => {
                let value_code = self.compile(value)?;
                code.write(value_code).at(span)?;
                code.emit(Instruction::ser(*schema as usize).at(span)?, span);
            }
        }
        Ok(code)
    }

    fn compile_block(
        &mut self,
        bindings: &'a [LetBinding<'a>],
        body: &'a Expr<'a>,
    ) -> Result<Code, CompileError> {
        let mark = self.scope.mark();
        let mut code = Code::new();
        for binding in bindings {
            let span = &binding.span;
            let (offset, value_code) = if binding.recursive {
                // The slot exists before the value so the value can see it.
                let offset = self.scope.add_binding(binding.name, span).at(span)?;
                let value_code = match &binding.value.kind {
                    ExprKind::Lambda { param, body } => {
                        self.compile_lambda(param, body, &binding.value.span, Some(offset))?
                    }
                    _ => self.compile(binding.value)?,
                };
                (offset, value_code)
            } else {
                let value_code = self.compile(binding.value)?;
                (self.scope.add_binding(binding.name, span).at(span)?, value_code)
            };
            code.write(value_code).at(span)?;
            code.emit(Instruction::store(offset).at(span)?, span);
        }
        let body_code = self.compile(body)?;
        code.write(body_code).at(&body.span)?;
        self.scope.release(mark);
        Ok(code)
    }

    /// Runs `f` in a branch scope, then folds the branch back in.
    fn in_branch<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let branch = self.scope.branch();
        let parent = core::mem::replace(&mut self.scope, branch);
        let result = f(self);
        let branch = core::mem::replace(&mut self.scope, parent);
        self.scope.adopt(branch);
        result
    }

    /// Binds `name` to the value on top of the stack, consuming it.
    fn bind_top(
        &mut self,
        code: &mut Code,
        name: &'a str,
        span: &Span,
    ) -> Result<(), CompileError> {
        if name == IGNORE {
            code.emit(Instruction::pop(), span);
        } else {
            let offset = self.scope.add_binding(name, span).at(span)?;
            code.emit(Instruction::store(offset).at(span)?, span);
        }
        Ok(())
    }

    /// Binds component `index` of the tuple on top of the stack, keeping the tuple.
    fn bind_component(
        &mut self,
        code: &mut Code,
        index: usize,
        name: &'a str,
        span: &Span,
    ) -> Result<(), CompileError> {
        if name != IGNORE {
            let index = Limit::Arity.check(index).at(span)? as u8;
            code.emit(Instruction::get(index), span);
            self.bind_top(code, name, span)?;
        }
        Ok(())
    }

    /// Arm body followed by a jump to its own end, which `write_branch`
    /// turns into a jump to the switch's join point.
    fn finish_arm(&mut self, mut code: Code, body: &'a Expr<'a>) -> Result<Code, CompileError> {
        let body_code = self.compile(body)?;
        code.write(body_code).at(&body.span)?;
        let fallthrough = code.len() + 1;
        code.emit(Instruction::jmp(fallthrough).at(&body.span)?, &body.span);
        Ok(code)
    }

    fn compile_switch(
        &mut self,
        scrutinee: &'a Expr<'a>,
        branches: &'a [SwitchBranch<'a>],
        span: &Span,
    ) -> Result<Code, CompileError> {
        let mut code = self.compile(scrutinee)?;

        let mut arms = Vec::with_capacity(branches.len());
        for branch in branches {
            let arm = self.in_branch(|this| {
                let mut prologue = Code::new();
                match branch.pattern.binding() {
                    PatternBinding::Ignore => prologue.emit(Instruction::pop(), &branch.span),
                    PatternBinding::Whole(name) => {
                        this.bind_top(&mut prologue, name, &branch.span)?
                    }
                    PatternBinding::Fields(names) => {
                        for (index, name) in names.iter().enumerate() {
                            this.bind_component(&mut prologue, index, name, &branch.span)?;
                        }
                        prologue.emit(Instruction::pop(), &branch.span);
                    }
                }
                this.finish_arm(prologue, branch.body)
            })?;
            arms.push(arm);
        }

        // [scrutinee][one dispatch per branch][arms][tail]
        let mut entry = code.len() + branches.len();
        let mut dispatch = Code::new();
        for (branch, arm) in branches.iter().zip(&arms) {
            let instruction = match branch.pattern.tag() {
                Some(tag) => Instruction::jif(tag, entry),
                None => Instruction::jmp(entry),
            };
            dispatch.emit(instruction.at(&branch.span)?, &branch.span);
            entry += arm.len();
        }
        let tail = entry;
        code.write_absolute(dispatch);
        for arm in arms {
            code.write_branch(arm, tail).at(span)?;
        }
        code.emit(Instruction::nop(), span);
        Ok(code)
    }

    fn compile_multi_switch(
        &mut self,
        scrutinees: &'a [&'a Expr<'a>],
        branches: &'a [MultiBranch<'a>],
        span: &Span,
    ) -> Result<Code, CompileError> {
        let mut code = Code::new();
        for scrutinee in scrutinees {
            let scrutinee_code = self.compile(scrutinee)?;
            code.write(scrutinee_code).at(span)?;
        }
        code.emit(Instruction::prod(scrutinees.len()).at(span)?, span);

        let mut arms = Vec::with_capacity(branches.len());
        for branch in branches {
            let arm = self.in_branch(|this| {
                let mut prologue = Code::new();
                if let MultiArm::Match(components) = &branch.arm {
                    for (index, component) in components.iter().enumerate() {
                        if let Some(name) = component.binding {
                            this.bind_component(&mut prologue, index, name, &branch.span)?;
                        }
                    }
                }
                prologue.emit(Instruction::pop(), &branch.span);
                this.finish_arm(prologue, branch.body)
            })?;
            arms.push(arm);
        }

        // MS, one MSI/MSD per component, MSJ; or a single JMP for default.
        let dispatch_len: usize = branches
            .iter()
            .map(|branch| match &branch.arm {
                MultiArm::Match(components) => components.len() + 2,
                MultiArm::Default => 1,
            })
            .sum();
        let mut entry = code.len() + dispatch_len;
        let mut dispatch = Code::new();
        for (branch, arm) in branches.iter().zip(&arms) {
            let at = &branch.span;
            match &branch.arm {
                MultiArm::Match(components) => {
                    dispatch.emit(Instruction::ms(), at);
                    for ComponentPattern { tag, .. } in components.iter() {
                        let instruction = match tag {
                            Some(tag) => Instruction::msi(*tag),
                            None => Instruction::msd(),
                        };
                        dispatch.emit(instruction, at);
                    }
                    dispatch.emit(Instruction::msj(entry).at(at)?, at);
                }
                MultiArm::Default => dispatch.emit(Instruction::jmp(entry).at(at)?, at),
            }
            entry += arm.len();
        }
        let tail = entry;
        code.write_absolute(dispatch);
        for arm in arms {
            code.write_branch(arm, tail).at(span)?;
        }
        code.emit(Instruction::nop(), span);
        Ok(code)
    }
}
