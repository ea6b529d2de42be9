//! The Tessel compilation engine.

use bumpalo::Bump;
use tracing::debug;

use super::{CompilationOptions, EngineOptions, Error};
use crate::{
    ast::ModuleIndex,
    compiler::Compilation,
    format,
    linker::{self, Program, ProgramMetadata, SchemaTable},
    natives::{NativeRegistry, RegistryBuilder},
    vm::{SchemaCodec, Vm},
};

/// Compiles resolved modules into programs and builds VMs to run them.
///
/// The engine owns the native registry: compilation resolves native names
/// against it and every VM it creates dispatches through it.
///
/// # Example
///
/// ```
/// use bumpalo::Bump;
/// use tessel_core::api::{Engine, EngineOptions};
/// use tessel_core::ast::{ExprBuilder, ModuleIndex};
/// use tessel_core::linker::{ProgramMetadata, SchemaTable};
/// use tessel_core::values::Value;
///
/// let arena = Bump::new();
/// let b = ExprBuilder::new(&arena);
/// let pair = b.lambda("x", b.tuple(&[b.local("x"), b.local("x")]));
/// let main = b.module("main", &[], &[b.function("pair", pair)], &[], &[]);
///
/// let engine = Engine::new(EngineOptions::default(), |_| {});
/// let program = engine
///     .compile(
///         &ModuleIndex::from_modules(&[main]),
///         &["main"],
///         &SchemaTable::new(),
///         ProgramMetadata::new("demo"),
///     )
///     .unwrap();
///
/// let values = Bump::new();
/// let mut vm = engine.vm(&program, &values).unwrap();
/// let pair = vm.function("main", "pair", 0).unwrap();
/// let result = vm.call(pair, Value::Int(7)).unwrap();
/// assert_eq!(result.to_string(), "(7, 7)");
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    registry: NativeRegistry,
    options: EngineOptions,
}

impl Engine {
    /// Create an engine, registering natives with `init`.
    pub fn new(options: EngineOptions, init: impl FnOnce(&mut RegistryBuilder)) -> Self {
        let mut builder = NativeRegistry::builder();
        init(&mut builder);
        Self::with_registry(options, builder.build())
    }

    pub fn with_registry(options: EngineOptions, registry: NativeRegistry) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &NativeRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compile `roots` (and everything they import) and link the result,
    /// with the engine's default compilation options.
    pub fn compile(
        &self,
        index: &ModuleIndex<'_>,
        roots: &[&str],
        schemas: &SchemaTable,
        metadata: ProgramMetadata,
    ) -> Result<Program, Error> {
        self.compile_with_options(
            index,
            roots,
            schemas,
            metadata,
            self.options.default_compilation_options.clone(),
        )
    }

    pub fn compile_with_options(
        &self,
        index: &ModuleIndex<'_>,
        roots: &[&str],
        schemas: &SchemaTable,
        metadata: ProgramMetadata,
        options: CompilationOptions,
    ) -> Result<Program, Error> {
        if roots.is_empty() {
            return Err(Error::Api(format!(
                "program `{}` has no root module",
                metadata.name
            )));
        }
        let mut compilation = Compilation::new(&self.registry, index, options);
        for root in roots {
            compilation.compile_module(root)?;
        }
        let (modules, data, closures) = compilation.into_parts();
        debug!(
            program = %metadata.name,
            modules = modules.len(),
            data = data.len(),
            closures = closures.len(),
            "Compiled program"
        );
        Ok(linker::create_program(
            metadata, modules, data, closures, schemas,
        )?)
    }

    /// A VM for `program`, with constants evaluated and values allocated in
    /// `arena`.
    pub fn vm<'p, 'a>(&'p self, program: &'p Program, arena: &'a Bump) -> Result<Vm<'p, 'a>, Error> {
        let options = self.options.default_execution_options.clone();
        Ok(Vm::with_options(program, &self.registry, arena, options)?)
    }

    /// Like [`vm`](Self::vm), with a codec for decode/encode instructions.
    pub fn vm_with_codec<'p, 'a>(
        &'p self,
        program: &'p Program,
        arena: &'a Bump,
        codec: &'p dyn SchemaCodec,
    ) -> Result<Vm<'p, 'a>, Error> {
        let options = self.options.default_execution_options.clone();
        Ok(Vm::with_codec(
            program,
            &self.registry,
            arena,
            options,
            codec,
        )?)
    }
}
