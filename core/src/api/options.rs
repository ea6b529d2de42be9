//! Configuration options for the Tessel engine.

/// Configuration options for compilation.
///
/// # Example
///
/// ```
/// use tessel_core::api::CompilationOptions;
///
/// let options = CompilationOptions {
///     report_unused: false,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct CompilationOptions {
    /// Report let bindings and pattern variables that are never read.
    /// Parameters and names spelled `_` are never reported.
    ///
    /// Default: true
    pub report_unused: bool,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            report_unused: true,
        }
    }
}

/// Configuration options for execution.
///
/// These control resource limits and buffer sizing of the VM.
///
/// # Example
///
/// ```
/// use tessel_core::api::ExecutionOptions;
///
/// let options = ExecutionOptions {
///     max_frames: 256,
///     ..ExecutionOptions::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Maximum number of live frames in one call chain (recursion
    /// protection). Tail calls reuse their caller's frame and do not count.
    ///
    /// Default: 10_000
    pub max_frames: usize,

    /// Value-stack slots pre-allocated per execution context.
    ///
    /// Default: 256
    pub initial_stack: usize,

    /// Execution contexts kept on the free list between calls.
    ///
    /// Default: 4
    pub pool_size: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_frames: 10_000,
            initial_stack: 256,
            pool_size: 4,
        }
    }
}

/// Configuration options for the Tessel engine.
///
/// # Example
///
/// ```
/// use tessel_core::api::{CompilationOptions, EngineOptions, ExecutionOptions};
///
/// let options = EngineOptions {
///     default_compilation_options: CompilationOptions::default(),
///     default_execution_options: ExecutionOptions {
///         max_frames: 500,
///         ..ExecutionOptions::default()
///     },
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Options used by `Engine::compile`.
    pub default_compilation_options: CompilationOptions,

    /// Options used by `Engine::vm`.
    pub default_execution_options: ExecutionOptions,
}
