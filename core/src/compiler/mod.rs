//! Bytecode compiler for resolved Tessel modules.
//!
//! Compiles the expression trees of top-level functions, constants and
//! effects into [`CompiledFunction`]s for the stack VM.
//!
//! ## Design
//!
//! - One [`expr::ExprCompiler`] per body; nested lambdas get their own and
//!   become closure templates referenced by the enclosing body
//! - Locals are compiled against scope positions and remapped to frame
//!   slots once the body's captures are known
//! - Global references stay symbolic ([`GlobalRef`]) until
//!   [`Compilation`] pools them and the linker assigns addresses
//! - Non-fatal diagnostics are collected; capacity overflows abort

mod closure;
mod error;
mod expr;
mod function;
mod module;


pub use closure::CompiledBody;
pub use error::CompileError;
pub use function::{
    BaseSize, BodyNode, CompiledFunction, ConstantKey, Dependency, FuncInfo, FuncNode, Function,
    FunctionKey, GlobalRef,
};
pub use module::{Compilation, CompiledModule, ConstantEntry, FunctionEntry};

use crate::{
    String,
    api::CompilationOptions,
    ast::{Expr, ExprKind, IGNORE, Span},
    scope_stack::Scope,
    vm::{Code, Instruction},
};
use error::AtSpan;
use expr::ExprCompiler;

/// Compiles the definition of a top-level function.
///
/// A definition that is not a lambda (say, an alias of another function)
/// is eta-expanded so every function body takes its argument the same way.
pub fn compile_function<'a>(
    definition: &'a Expr<'a>,
    module: &str,
    name: &str,
    span: &Span,
    options: &CompilationOptions,
) -> Result<CompiledBody, CompileError> {
    let mut compiler = ExprCompiler::new(Scope::new(), options, module, String::from(name));
    let code = match &definition.kind {
        ExprKind::Lambda { param, body } => {
            compiler.add_parameter(param, span)?;
            compiler.compile(body)?
        }
        _ => {
            let param = compiler.add_parameter(IGNORE, span)?;
            let mut code = Code::new();
            let at = &definition.span;
            code.emit(Instruction::load(param).at(at)?, at);
            let function_code = compiler.compile(definition)?;
            code.write(function_code).at(at)?;
            code.emit(Instruction::call(), at);
            code
        }
    };
    compiler.finish(code, &[], None, false, span)
}

/// Compiles a constant initializer or an effect: a body whose argument
/// is ignored.
pub fn compile_constant<'a>(
    expr: &'a Expr<'a>,
    module: &str,
    name: &str,
    span: &Span,
    options: &CompilationOptions,
) -> Result<CompiledBody, CompileError> {
    let mut compiler = ExprCompiler::new(Scope::new(), options, module, String::from(name));
    compiler.add_parameter(IGNORE, span)?;
    let code = compiler.compile(expr)?;
    compiler.finish(code, &[], None, false, span)
}
