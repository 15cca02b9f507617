use crate::types::{Ty, TypeVar};
use smol_str::SmolStr;
use tarn_lexer::Span;
use thiserror::Error;

/// Structured compile error. Rendering is the embedder's job; each variant
/// carries the names, types and spans it needs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("unknown symbol `{name}`")]
    UnknownSymbol { name: SmolStr, span: Span },

    #[error("cannot assign to immutable binding `{name}`")]
    AssignToImmutable { name: SmolStr, span: Span },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Ty, found: Ty, span: Span },

    #[error("arity mismatch: expected {expected} parameters, found {found}")]
    ArityMismatch {
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("infinite type: ?{var} occurs in {ty}")]
    InfiniteType { var: TypeVar, ty: Ty, span: Span },

    #[error("recursive value `{name}`")]
    RecursiveValue { name: SmolStr },

    #[error("type {ty} has no WebAssembly representation")]
    UnsupportedReturnType { ty: Ty },

    #[error("foreign import `{module}.{name}` is never used")]
    UnusedForeignImport {
        module: SmolStr,
        name: SmolStr,
        span: Span,
    },
}

impl CompileError {
    /// The source span the error is anchored to, when it has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::UnknownSymbol { span, .. }
            | CompileError::AssignToImmutable { span, .. }
            | CompileError::TypeMismatch { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::InfiniteType { span, .. }
            | CompileError::UnusedForeignImport { span, .. } => Some(*span),
            CompileError::RecursiveValue { .. } | CompileError::UnsupportedReturnType { .. } => {
                None
            }
        }
    }
}
