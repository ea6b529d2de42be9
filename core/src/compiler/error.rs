//! Bytecode compilation errors.

use thiserror::Error;

use crate::api::{Diagnostic, Severity};
use crate::vm::LimitExceeded;
use crate::{String, ast::Span, format};

/// Errors that can occur during bytecode compilation.
///
/// Everything except [`CapacityExceeded`](Self::CapacityExceeded) and
/// [`UnboundLocal`](Self::UnboundLocal) is collected, so one run reports as
/// much as possible. Those two abort the body being compiled: the first means
/// the program cannot be encoded, the second that the front end handed over
/// an unresolved tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("unknown native `{name}`")]
    UnknownNative { name: String, span: Span },

    #[error("unused binding `{name}`")]
    UnusedBinding { name: String, span: Span },

    #[error("unknown module `{name}`")]
    UnknownModule { name: String },

    #[error("unbound local `{name}`")]
    UnboundLocal { name: String, span: Span },

    #[error("{limit}")]
    CapacityExceeded { limit: LimitExceeded, span: Span },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::UnknownNative { span, .. }
            | CompileError::UnusedBinding { span, .. }
            | CompileError::UnboundLocal { span, .. }
            | CompileError::CapacityExceeded { span, .. } => span.clone(),
            CompileError::UnknownModule { .. } => Span::default(),
        }
    }

    /// Convert to a Diagnostic for API boundary.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let help = match self {
            CompileError::UnknownNative { .. } => {
                Some("register it in the native registry before compiling")
            }
            CompileError::UnusedBinding { name, .. } if !name.starts_with('_') => {
                Some("if this is intentional, name it `_`")
            }
            _ => None,
        };
        Diagnostic {
            severity: Severity::Error,
            message: format!("{}", self),
            span: self.span(),
            related: crate::Vec::new(),
            help: help.map(String::from),
            code: None,
        }
    }
}

/// Attaches the span of the node being compiled to a capacity overflow.
pub(crate) trait AtSpan<T> {
    fn at(self, span: &Span) -> Result<T, CompileError>;
}

impl<T> AtSpan<T> for Result<T, LimitExceeded> {
    fn at(self, span: &Span) -> Result<T, CompileError> {
        self.map_err(|limit| CompileError::CapacityExceeded {
            limit,
            span: span.clone(),
        })
    }
}
