//! Link errors.

use thiserror::Error;

use crate::api::{Diagnostic, Severity};
use crate::compiler::{ConstantKey, FunctionKey};
use crate::vm::LimitExceeded;
use crate::{String, Vec, ast::Span, format};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Constants whose initializers depend on each other.
    ///
    /// `names` lists every constant that could not be ordered, which
    /// includes whatever only depends on the cycle; `span` is one of them.
    #[error("circular constant dependency between {}", .names.join(", "))]
    CircularConstants { names: Vec<String>, span: Span },

    #[error("unresolved function `{key}`")]
    UnresolvedFunction { key: FunctionKey, from: String },

    #[error("unresolved constant `{key}`")]
    UnresolvedConstant { key: ConstantKey, from: String },

    #[error("unknown schema #{index}")]
    UnknownSchema { index: usize, from: String },

    /// A body references a pool entry that does not exist.
    #[error("invalid {kind} dependency {index} in `{from}`")]
    InvalidDependency {
        kind: &'static str,
        index: usize,
        from: String,
    },

    #[error("{0}")]
    CapacityExceeded(#[from] LimitExceeded),
}

impl LinkError {
    /// Convert to a Diagnostic for API boundary.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let span = match self {
            LinkError::CircularConstants { span, .. } => span.clone(),
            _ => Span::default(),
        };
        let help = match self {
            LinkError::CircularConstants { .. } => {
                Some("a constant cannot depend on its own value; make one of them a function")
            }
            LinkError::UnresolvedFunction { from, .. }
            | LinkError::UnresolvedConstant { from, .. } => {
                return Diagnostic::error(format!("{}", self), span)
                    .with_help(&format!("referenced from `{}`; is its module compiled?", from));
            }
            _ => None,
        };
        Diagnostic {
            severity: Severity::Error,
            message: format!("{}", self),
            span,
            related: Vec::new(),
            help: help.map(String::from),
            code: None,
        }
    }
}
