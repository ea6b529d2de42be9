//! Public API for the Tessel compiler and VM.
//!
//! The pipeline has three stages, each with its own error type that converts
//! into [`Error`] at this boundary:
//!
//! 1. **Compile**: resolved modules become bytecode bodies
//!    ([`crate::compiler::Compilation`])
//! 2. **Link**: bodies are placed in one global address space
//!    ([`crate::linker::create_program`])
//! 3. **Run**: a [`crate::vm::Vm`] evaluates constants, then serves calls
//!
//! [`Engine`] drives all three with a shared native registry.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use tessel_core::api::{Engine, EngineOptions};
//! use tessel_core::ast::{ExprBuilder, ModuleIndex};
//! use tessel_core::linker::{ProgramMetadata, SchemaTable};
//! use tessel_core::values::Value;
//!
//! let arena = Bump::new();
//! let b = ExprBuilder::new(&arena);
//! let add = b.native_function("add", "int.add");
//! let answer = b.constant_decl(
//!     "answer",
//!     b.call(b.global("main", "add"), b.tuple(&[b.int(40), b.int(2)])),
//! );
//! let main = b.module("main", &[], &[add], &[answer], &[]);
//!
//! let engine = Engine::new(EngineOptions::default(), tessel_core::stdlib::register);
//! let index = ModuleIndex::from_modules(&[main]);
//! let program = engine
//!     .compile(&index, &["main"], &SchemaTable::new(), ProgramMetadata::new("answer"))
//!     .unwrap();
//!
//! let values = Bump::new();
//! let vm = engine.vm(&program, &values).unwrap();
//! assert_eq!(vm.constant("main", "answer"), Some(Value::Int(42)));
//! ```

pub mod engine;
pub mod error;
pub mod options;

pub use engine::Engine;
pub use error::{Diagnostic, Error, RelatedInfo, Severity};
pub use options::{CompilationOptions, EngineOptions, ExecutionOptions};
