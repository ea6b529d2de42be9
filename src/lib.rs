//! Tessel - compile resolved expression modules to bytecode and run them
//!
//! # Overview
//!
//! Tessel takes modules that a front end has already parsed, resolved and
//! type-checked, and turns them into a single linked program for a small
//! stack VM:
//!
//! - **Compile**: each function, constant and effect becomes a bytecode body
//! - **Link**: bodies are placed in one global address space and constant
//!   initializers are ordered by their dependencies
//! - **Run**: the VM evaluates every constant once, then serves calls
//!
//! Programs serialize with postcard, so compilation and execution can happen
//! in different processes.
//!
//! # Quick Start
//!
//! ```
//! use bumpalo::Bump;
//! use tessel::{Engine, EngineOptions, ExprBuilder, ModuleIndex, ProgramMetadata, SchemaTable, Value};
//!
//! let arena = Bump::new();
//! let b = ExprBuilder::new(&arena);
//! let double = b.lambda(
//!     "x",
//!     b.call(b.global("main", "add"), b.tuple(&[b.local("x"), b.local("x")])),
//! );
//! let main = b.module(
//!     "main",
//!     &[],
//!     &[b.native_function("add", "int.add"), b.function("double", double)],
//!     &[],
//!     &[],
//! );
//!
//! let engine = Engine::new(EngineOptions::default(), tessel::stdlib::register);
//! let program = engine
//!     .compile(
//!         &ModuleIndex::from_modules(&[main]),
//!         &["main"],
//!         &SchemaTable::new(),
//!         ProgramMetadata::new("quick-start"),
//!     )
//!     .unwrap();
//!
//! let values = Bump::new();
//! let mut vm = engine.vm(&program, &values).unwrap();
//! let double = vm.function("main", "double", 0).unwrap();
//! assert_eq!(vm.call(double, Value::Int(21)).unwrap(), Value::Int(42));
//! ```
//!
//! # Natives
//!
//! Host functions share one signature. They get the running VM, so they can
//! allocate results in its arena and call back into compiled code:
//!
//! ```
//! use tessel::{Engine, EngineOptions, ExecutionError, Value, Vm};
//!
//! fn twice<'a>(vm: &mut Vm<'_, 'a>, argument: Value<'a>) -> Result<Value<'a>, ExecutionError> {
//!     let Some(&[f, x]) = argument.as_tuple() else {
//!         return Err(ExecutionError::native("twice", "expected a pair"));
//!     };
//!     let once = vm.call(f, x)?;
//!     vm.call(f, once)
//! }
//!
//! let engine = Engine::new(EngineOptions::default(), |natives| {
//!     natives.register_function("twice", twice);
//! });
//! assert!(engine.registry().function_id("twice").is_some());
//! ```

mod error_renderer;

pub use error_renderer::{
    render_error, render_error_to, render_error_to_string, render_error_to_string_no_color,
};

// Re-export public API from tessel_core
pub use tessel_core::api::{
    CompilationOptions, Diagnostic, Engine, EngineOptions, Error, ExecutionOptions, RelatedInfo,
    Severity,
};

// Re-export the pieces a host touches to build, link and run programs
pub use tessel_core::ast::{self, ExprBuilder, ModuleIndex, Span};
pub use tessel_core::linker::{Program, ProgramMetadata, SchemaTable};
pub use tessel_core::natives::{NativeFn, NativeRegistry, RegistryBuilder};
pub use tessel_core::values::{self, Literal, Value};
pub use tessel_core::vm::{ExecutionError, SchemaCodec, Vm};
pub use tessel_core::{compiler, linker, stdlib};
