//! Lambda bodies: capture analysis and frame layout.
//!
//! A body is compiled against scope positions. Once it is complete, the set
//! of captured outer bindings and the slot high-water mark are known, and
//! every `LOAD`/`STORE` is rewritten to its final frame offset:
//!
//! ```text
//! scope:  [outer bindings (seeded)][param][locals...]
//! frame:  [captures][self?][locals...][param]
//! ```

use super::error::{AtSpan, CompileError};
use super::expr::ExprCompiler;
use super::function::{BaseSize, CompiledFunction, FuncInfo, GlobalRef};
use crate::{
    String, Vec,
    ast::{Expr, Span},
    format,
    vm::{Code, Instruction, Limit},
};

/// Where each scope position of a finished body lives in its frame.
struct FrameLayout<'s> {
    seeded: usize,
    captures: &'s [usize],
    self_offset: Option<usize>,
    size: BaseSize,
}

impl FrameLayout<'_> {
    fn slot(&self, offset: usize) -> Option<usize> {
        let context = self.size.context as usize;
        if offset < self.seeded {
            if Some(offset) == self.self_offset {
                return Some(context - 1);
            }
            self.captures.iter().position(|&c| c == offset)
        } else if offset == self.seeded {
            Some(self.size.argument())
        } else {
            Some(context + (offset - self.seeded - 1))
        }
    }
}

/// Rewrites local offsets from scope positions to frame slots.
fn remap_locals(
    code: &mut Code,
    layout: &FrameLayout<'_>,
    scope: &crate::scope_stack::Scope<'_>,
    span: &Span,
) -> Result<(), CompileError> {
    for instruction in code.instructions_mut() {
        if !instruction.is_local() {
            continue;
        }
        let offset = instruction.offset();
        let slot = layout.slot(offset).ok_or_else(|| CompileError::UnboundLocal {
            name: scope
                .binding(offset)
                .map(|b| String::from(b.name))
                .unwrap_or_default(),
            span: span.clone(),
        })?;
        *instruction = instruction.with_offset(slot).at(span)?;
    }
    Ok(())
}

/// A compiled body with the references and diagnostics it still owes
/// the rest of the pipeline.
#[derive(Debug)]
pub struct CompiledBody {
    pub function: CompiledFunction,
    pub refs: Vec<GlobalRef>,
    pub errors: Vec<CompileError>,
}

impl<'c, 'a> ExprCompiler<'c, 'a> {
    /// Declares the body's parameter. It must be the first binding after
    /// the seeded ones.
    pub(super) fn add_parameter(
        &mut self,
        param: &'a str,
        span: &Span,
    ) -> Result<usize, CompileError> {
        let offset = self.scope.add_binding(param, span).at(span)?;
        // Parameters are part of the signature and never reported unused.
        self.scope.touch(offset);
        Ok(offset)
    }

    /// Lays out the frame of a compiled body and collects its diagnostics.
    ///
    /// `captures` are outer scope positions in context-slot order; when
    /// `recursive` is set the closure itself takes the slot after them.
    pub(super) fn finish(
        self,
        mut code: Code,
        captures: &[usize],
        self_offset: Option<usize>,
        recursive: bool,
        span: &Span,
    ) -> Result<CompiledBody, CompileError> {
        let seeded = self.scope.seeded();
        let context = Limit::Captures
            .check(captures.len() + recursive as usize)
            .at(span)?;
        let reserved = self.scope.high_water().saturating_sub(seeded + 1);
        Limit::Locals.check(context as usize + reserved).at(span)?;
        let layout = FrameLayout {
            seeded,
            captures,
            self_offset: self_offset.filter(|_| recursive),
            size: BaseSize {
                context,
                reserved: reserved as u32,
            },
        };
        remap_locals(&mut code, &layout, &self.scope, span)?;

        let mut errors = self.errors;
        if self.options.report_unused {
            errors.extend(
                self.scope
                    .collect_unused()
                    .into_iter()
                    .map(|binding| CompileError::UnusedBinding {
                        name: String::from(binding.name),
                        span: binding.span,
                    }),
            );
        }

        Ok(CompiledBody {
            function: CompiledFunction {
                code,
                size: layout.size,
                info: FuncInfo {
                    module: String::from(self.module),
                    name: self.name,
                    span: span.clone(),
                },
            },
            refs: self.refs,
            errors,
        })
    }

    /// Compiles a lambda and emits the code that builds its closure.
    ///
    /// `self_offset` is the outer slot of a `let rec` binding whose value
    /// this lambda is; a reference to it becomes the injected self slot
    /// instead of a capture.
    pub(super) fn compile_lambda(
        &mut self,
        param: &'a str,
        body: &'a Expr<'a>,
        span: &Span,
        self_offset: Option<usize>,
    ) -> Result<Code, CompileError> {
        let name = format!("{}.<lambda>", self.name);
        let mut inner = ExprCompiler::new(self.scope.closure(), self.options, self.module, name);
        inner.add_parameter(param, span)?;
        let body_code = inner.compile(body)?;
        let (captures, recursive) = inner.scope.captures(self_offset);
        let finished = inner.finish(body_code, &captures, self_offset, recursive, span)?;
        self.errors.extend(finished.errors);

        let template = self.global_ref(GlobalRef::Closure {
            function: finished.function,
            refs: finished.refs,
        });
        let mut code = Code::new();
        code.emit(Instruction::global(template).at(span)?, span);
        for &offset in &captures {
            self.scope.touch(offset);
            code.emit(Instruction::load(offset).at(span)?, span);
        }
        code.emit(Instruction::prod(captures.len()).at(span)?, span);
        code.emit(Instruction::ctx(recursive), span);
        Ok(code)
    }
}
