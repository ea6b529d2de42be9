//! Whole-module compilation and pooling of global references.

use hashbrown::HashSet;
use tracing::{debug, trace};

use super::{
    CompileError, compile_constant, compile_function,
    closure::CompiledBody,
    error::AtSpan,
    function::{
        BaseSize, BodyNode, CompiledFunction, ConstantKey, Dependency, FuncInfo, FuncNode,
        Function, FunctionKey, GlobalRef,
    },
};
use crate::{
    String, Vec,
    api::CompilationOptions,
    ast::{Definition, ModuleIndex, Span},
    format,
    natives::NativeRegistry,
    values::Literal,
    vec,
    vm::{Code, Instruction},
};

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    pub key: FunctionKey,
    pub span: Span,
    pub node: FuncNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantEntry {
    pub key: ConstantKey,
    pub span: Span,
    pub node: BodyNode,
}

/// Everything compiled from one module, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModule {
    pub name: String,
    pub functions: Vec<FunctionEntry>,
    pub constants: Vec<ConstantEntry>,
    pub effects: Vec<BodyNode>,
}

/// Compiles modules and their imports, pooling inline data and closure
/// templates so the linker sees one table of each.
pub struct Compilation<'r, 'a> {
    registry: &'r NativeRegistry,
    index: &'r ModuleIndex<'a>,
    options: CompilationOptions,
    modules: Vec<CompiledModule>,
    visited: HashSet<&'a str>,
    data: Vec<Literal>,
    closures: Vec<BodyNode>,
}

impl<'r, 'a> Compilation<'r, 'a> {
    pub fn new(
        registry: &'r NativeRegistry,
        index: &'r ModuleIndex<'a>,
        options: CompilationOptions,
    ) -> Self {
        Self {
            registry,
            index,
            options,
            modules: Vec::new(),
            visited: HashSet::new(),
            data: Vec::new(),
            closures: Vec::new(),
        }
    }

    /// Compiles `name` after its imports. Modules already compiled by this
    /// compilation are skipped.
    ///
    /// Diagnostics of one module are all reported together; a capacity
    /// overflow stops at the body that caused it.
    pub fn compile_module(&mut self, name: &str) -> Result<(), Vec<CompileError>> {
        let Some(module) = self.index.get(name) else {
            return Err(vec![CompileError::UnknownModule {
                name: String::from(name),
            }]);
        };
        if !self.visited.insert(module.name) {
            return Ok(());
        }
        for import in module.imports {
            self.compile_module(import)?;
        }

        let mut errors = Vec::new();
        let mut compiled = CompiledModule {
            name: String::from(module.name),
            functions: Vec::with_capacity(module.functions.len()),
            constants: Vec::with_capacity(module.constants.len()),
            effects: Vec::with_capacity(module.effects.len()),
        };

        for decl in module.functions {
            let overload = compiled
                .functions
                .iter()
                .filter(|entry| entry.key.name == decl.name)
                .count() as u32;
            let key = FunctionKey::new(module.name, decl.name, overload);
            let node = match &decl.definition {
                Definition::Native(external) => match self.registry.function_id(external) {
                    Some(id) => FuncNode {
                        function: Function::Native(id),
                        deps: Vec::new(),
                    },
                    None => {
                        errors.push(unknown_native(external, &decl.span));
                        continue;
                    }
                },
                Definition::Expr(expr) => {
                    let body =
                        compile_function(expr, module.name, decl.name, &decl.span, &self.options)
                            .map_err(|err| abort(&mut errors, err))?;
                    let (function, deps) = self.take_body(body, &mut errors);
                    FuncNode {
                        function: Function::Compiled(function),
                        deps,
                    }
                }
            };
            trace!(function = %key, "Compiled function");
            compiled.functions.push(FunctionEntry {
                key,
                span: decl.span.clone(),
                node,
            });
        }

        for decl in module.constants {
            let key = ConstantKey::new(module.name, decl.name);
            let node = match &decl.definition {
                Definition::Native(external) => match self.registry.constant(external) {
                    Some(literal) => {
                        let literal = literal.clone();
                        self.native_constant(literal, module.name, decl.name, &decl.span)
                            .map_err(|err| abort(&mut errors, err))?
                    }
                    None => {
                        errors.push(unknown_native(external, &decl.span));
                        continue;
                    }
                },
                Definition::Expr(expr) => {
                    let body =
                        compile_constant(expr, module.name, decl.name, &decl.span, &self.options)
                            .map_err(|err| abort(&mut errors, err))?;
                    let (function, deps) = self.take_body(body, &mut errors);
                    BodyNode { function, deps }
                }
            };
            trace!(constant = %key, "Compiled constant");
            compiled.constants.push(ConstantEntry {
                key,
                span: decl.span.clone(),
                node,
            });
        }

        for (i, effect) in module.effects.iter().enumerate() {
            let name = format!("<effect {}>", i);
            let body = compile_constant(effect, module.name, &name, &effect.span, &self.options)
                .map_err(|err| abort(&mut errors, err))?;
            let (function, deps) = self.take_body(body, &mut errors);
            compiled.effects.push(BodyNode { function, deps });
        }

        if !errors.is_empty() {
            debug!(module = module.name, errors = errors.len(), "Module failed to compile");
            return Err(errors);
        }
        debug!(
            module = module.name,
            functions = compiled.functions.len(),
            constants = compiled.constants.len(),
            effects = compiled.effects.len(),
            "Compiled module"
        );
        self.modules.push(compiled);
        Ok(())
    }

    /// Modules in compilation order: every module after its imports.
    pub fn modules(&self) -> &[CompiledModule] {
        &self.modules
    }

    pub fn data(&self) -> &[Literal] {
        &self.data
    }

    pub fn closures(&self) -> &[BodyNode] {
        &self.closures
    }

    pub fn into_parts(self) -> (Vec<CompiledModule>, Vec<Literal>, Vec<BodyNode>) {
        (self.modules, self.data, self.closures)
    }

    fn take_body(
        &mut self,
        body: CompiledBody,
        errors: &mut Vec<CompileError>,
    ) -> (CompiledFunction, Vec<Dependency>) {
        errors.extend(body.errors);
        let deps = self.pool_refs(body.refs);
        (body.function, deps)
    }

    /// Replaces inline data and closures by their pool indexes.
    fn pool_refs(&mut self, refs: Vec<GlobalRef>) -> Vec<Dependency> {
        refs.into_iter()
            .map(|global| match global {
                GlobalRef::Data(literal) => Dependency::Data(self.pool_data(literal)),
                GlobalRef::Function(key) => Dependency::Function(key),
                GlobalRef::Constant(key) => Dependency::Constant(key),
                GlobalRef::Closure { function, refs } => {
                    let deps = self.pool_refs(refs);
                    self.closures.push(BodyNode { function, deps });
                    Dependency::Closure((self.closures.len() - 1) as u32)
                }
            })
            .collect()
    }

    fn pool_data(&mut self, literal: Literal) -> u32 {
        match self.data.iter().position(|existing| *existing == literal) {
            Some(index) => index as u32,
            None => {
                self.data.push(literal);
                (self.data.len() - 1) as u32
            }
        }
    }

    /// A host-provided constant is a body that pushes its literal.
    fn native_constant(
        &mut self,
        literal: Literal,
        module: &str,
        name: &str,
        span: &Span,
    ) -> Result<BodyNode, CompileError> {
        let mut code = Code::new();
        let mut deps = Vec::new();
        if literal == Literal::Nil {
            code.emit(Instruction::nil(), span);
        } else {
            deps.push(Dependency::Data(self.pool_data(literal)));
            code.emit(Instruction::global(0).at(span)?, span);
        }
        Ok(BodyNode {
            function: CompiledFunction {
                code,
                size: BaseSize::default(),
                info: FuncInfo {
                    module: String::from(module),
                    name: String::from(name),
                    span: span.clone(),
                },
            },
            deps,
        })
    }
}

fn unknown_native(name: &str, span: &Span) -> CompileError {
    CompileError::UnknownNative {
        name: String::from(name),
        span: span.clone(),
    }
}

/// Appends the fatal error to what was collected so far.
fn abort(errors: &mut Vec<CompileError>, err: CompileError) -> Vec<CompileError> {
    errors.push(err);
    core::mem::take(errors)
}
