use crate::types::{Ty, TypeVar};
use tarn_lexer::Span;

/// Literal origin of a type variable — drives numeric defaulting after
/// solving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VarKind {
    General,
    IntLit,
    FloatLit,
}

/// One recorded equality.
#[derive(Clone, Debug)]
pub struct Equal {
    pub left: Ty,
    pub right: Ty,
    pub span: Span,
}

/// Append-only store of equality constraints plus the fresh-variable
/// counter. Insertion order is kept so the solver reports errors
/// deterministically; it does not affect which programs type-check.
#[derive(Debug, Default)]
pub struct Constraints {
    pub(crate) equals: Vec<Equal>,
    pub(crate) kinds: Vec<VarKind>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh inference variable.
    pub fn fresh(&mut self) -> Ty {
        self.fresh_kind(VarKind::General)
    }

    /// Fresh variable for an integer literal; defaults to `i32` if nothing
    /// pins it.
    pub(crate) fn fresh_int(&mut self) -> Ty {
        self.fresh_kind(VarKind::IntLit)
    }

    /// Fresh variable for a float literal; defaults to `f64` if nothing
    /// pins it.
    pub(crate) fn fresh_float(&mut self) -> Ty {
        self.fresh_kind(VarKind::FloatLit)
    }

    fn fresh_kind(&mut self, kind: VarKind) -> Ty {
        let id = self.kinds.len() as TypeVar;
        self.kinds.push(kind);
        Ty::Var(id)
    }

    /// Record `left = right`.
    pub fn equate(&mut self, left: Ty, right: Ty, span: Span) {
        self.equals.push(Equal { left, right, span });
    }

    pub fn var_count(&self) -> usize {
        self.kinds.len()
    }
}
