//! Public error types for the Tessel API.
//!
//! Internal error enums (compile, link, execution) convert into these at the
//! API boundary, so callers only ever see [`Error`] and [`Diagnostic`].

use core::fmt;

use crate::ast::Span;
use crate::{String, Vec, format};

/// Public error type for all Tessel operations.
#[derive(Debug)]
pub enum Error {
    /// Invalid API usage (e.g. an unknown root module).
    Api(String),

    /// Compilation errors, collected across every compiled module.
    Compilation { diagnostics: Vec<Diagnostic> },

    /// The compiled modules could not be linked into one program.
    Link(Diagnostic),

    /// Runtime failure while evaluating constants or running code.
    Runtime(Diagnostic),

    /// Resource limits exceeded (e.g. too many live frames).
    ResourceExceeded(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Api(msg) => write!(f, "API error: {}", msg),
            Error::Compilation { diagnostics } => {
                let error_count = diagnostics
                    .iter()
                    .filter(|d| d.severity == Severity::Error)
                    .count();
                write!(f, "Compilation failed with {} error(s)", error_count)
            }
            Error::Link(diagnostic) => write!(f, "Link error: {}", diagnostic.message),
            Error::Runtime(diagnostic) => write!(f, "Runtime error: {}", diagnostic.message),
            Error::ResourceExceeded(msg) => write!(f, "Resource limit exceeded: {}", msg),
        }
    }
}

impl core::error::Error for Error {}

/// A diagnostic message (error, warning, or info) with source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,

    /// Primary diagnostic message.
    pub message: String,

    /// Source location of the primary issue.
    pub span: Span,

    /// Related locations that provide additional context.
    pub related: Vec<RelatedInfo>,

    /// Optional help text suggesting how to fix the issue.
    pub help: Option<String>,

    /// Optional error code (e.g., "E001") for documentation lookup.
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            span,
            related: Vec::new(),
            help: None,
            code: None,
        }
    }

    pub fn warning(message: String, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(message, span)
        }
    }

    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(String::from(help));
        self
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(String::from(code));
        self
    }

    pub fn with_related(mut self, span: Span, message: String) -> Self {
        self.related.push(RelatedInfo { span, message });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - compilation cannot succeed.
    Error,
    /// Warning - suspicious code that might be wrong.
    Warning,
    /// Info - informational message.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Related information for a diagnostic (e.g., "declared here").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedInfo {
    pub span: Span,
    pub message: String,
}

// ============================================================================
// Conversion from internal errors
// ============================================================================

impl From<Vec<crate::compiler::CompileError>> for Error {
    fn from(errors: Vec<crate::compiler::CompileError>) -> Self {
        Error::Compilation {
            diagnostics: errors.iter().map(|e| e.to_diagnostic()).collect(),
        }
    }
}

impl From<crate::linker::LinkError> for Error {
    fn from(err: crate::linker::LinkError) -> Self {
        Error::Link(err.to_diagnostic())
    }
}

impl From<crate::vm::ExecutionError> for Error {
    fn from(err: crate::vm::ExecutionError) -> Self {
        if err.is_resource_exceeded() {
            Error::ResourceExceeded(format!("{}", err.kind))
        } else {
            Error::Runtime(err.to_diagnostic())
        }
    }
}
