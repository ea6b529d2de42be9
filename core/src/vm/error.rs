//! Runtime errors.
//!
//! A correctly compiled program never trips the structural checks here
//! (tag mismatches, underflows, bad addresses); they indicate a codegen defect
//! or a corrupted program image. Resource and native failures are the only
//! kinds a well-formed program can hit.

use core::fmt;

use thiserror::Error;

use crate::api::{Diagnostic, RelatedInfo, Severity};
use crate::{String, Vec, ast::Span, format};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionErrorKind {
    #[error("{opcode} expected {expected}, found {found}")]
    TagMismatch {
        opcode: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("stack underflow in {opcode}")]
    StackUnderflow { opcode: &'static str },

    #[error("value of kind {found} is not callable")]
    NotCallable { found: &'static str },

    #[error("no global slot at address {address}")]
    InvalidAddress { address: usize },

    #[error("local slot {offset} is outside the current frame")]
    InvalidLocal { offset: usize },

    #[error("component {index} out of range for tuple of {len}")]
    ComponentOutOfRange { index: usize, len: usize },

    #[error("match buffer holds {buffered} components but the tuple has {len}")]
    MatchArity { buffered: usize, len: usize },

    #[error("native function `{name}` failed: {message}")]
    Native { name: String, message: String },

    #[error("schema `{schema}`: {message}")]
    Schema { schema: String, message: String },

    #[error("no schema codec is installed")]
    MissingCodec,

    #[error("call depth {depth} exceeds maximum of {max_frames}")]
    ResourceExceeded { depth: usize, max_frames: usize },
}

/// One live frame at the moment an error unwound through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Display name of the executing function (`module.name`).
    pub function: String,
    /// Where the function was declared.
    pub declared: Span,
    /// Source of the last instruction the frame executed.
    pub at: Span,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in {} (declared at {}) at {}",
            self.function, self.declared, self.at
        )
    }
}

/// A runtime failure with the frames it unwound through, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub trace: Vec<TraceFrame>,
}

impl ExecutionError {
    /// Failure reported by a native function.
    pub fn native(name: &str, message: impl Into<String>) -> Self {
        ExecutionErrorKind::Native {
            name: String::from(name),
            message: message.into(),
        }
        .into()
    }

    pub fn is_resource_exceeded(&self) -> bool {
        matches!(self.kind, ExecutionErrorKind::ResourceExceeded { .. })
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let span = self
            .trace
            .first()
            .map(|frame| frame.at.clone())
            .unwrap_or_default();
        let related = self
            .trace
            .iter()
            .map(|frame| RelatedInfo {
                span: frame.declared.clone(),
                message: format!("in {}", frame.function),
            })
            .collect();
        Diagnostic {
            severity: Severity::Error,
            message: format!("{}", self.kind),
            span,
            related,
            help: None,
            code: None,
        }
    }
}

impl From<ExecutionErrorKind> for ExecutionError {
    fn from(kind: ExecutionErrorKind) -> Self {
        Self {
            kind,
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for frame in &self.trace {
            write!(f, "\n  {}", frame)?;
        }
        Ok(())
    }
}

impl core::error::Error for ExecutionError {}
