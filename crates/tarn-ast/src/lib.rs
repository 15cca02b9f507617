use la_arena::{Arena, Idx};

pub use tarn_lexer::{Name, Position, Span};

pub type ExprId = Idx<Expr>;

// ── Module ───────────────────────────────────────────────────────

/// A parsed source module: top-level definitions over one expression
/// arena. The arena owns every node; parents refer to children by id, so
/// the whole tree is released in one drop at the end of the job.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub defs: Vec<Def>,
    pub exprs: Arena<Expr>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.exprs.alloc(Expr { kind, span })
    }

    pub fn def(&self, name: Name) -> Option<&Def> {
        self.defs.iter().find(|d| d.name == name)
    }
}

/// Top-level definition: `name = value`.
#[derive(Debug, Clone)]
pub struct Def {
    pub name: Name,
    pub name_span: Span,
    pub value: ExprId,
    pub span: Span,
}

// ── Expressions ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer literal, interned verbatim.
    Int(Name),
    /// Float literal, interned verbatim.
    Float(Name),
    Bool(bool),
    /// String literal including its quotes.
    Str(Name),
    /// Name reference.
    Symbol(Name),
    /// Binding definition: `name = value`.
    Define {
        name: Name,
        name_span: Span,
        value: ExprId,
        mutable: bool,
    },
    /// Statement whose value is discarded.
    Drop(ExprId),
    /// `name += value`.
    PlusEqual {
        name: Name,
        name_span: Span,
        value: ExprId,
    },
    /// `name *= value`.
    TimesEqual {
        name: Name,
        name_span: Span,
        value: ExprId,
    },
    /// Function literal: `fn(params) ret? { body }`.
    Function {
        params: Vec<Param>,
        return_ann: Option<TypeAnn>,
        body: ExprId,
    },
    Binary {
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// Parenthesized sequence. Unlike a block it opens no scope.
    Group(Vec<ExprId>),
    /// Braced statement sequence with its own scope; its value is the last
    /// expression's, or void when empty.
    Block(Vec<ExprId>),
    /// `if`/`or`/`else` chain. A missing `else` is an empty block.
    Branch {
        arms: Vec<Arm>,
        else_body: ExprId,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    /// Builtin primitive call; only the numeric conversions exist.
    Intrinsic {
        name: Name,
        args: Vec<ExprId>,
    },
    /// `module.name` — a function provided by the host.
    ForeignImport {
        module: Name,
        name: Name,
    },
    /// Definition surfaced to the host under `name`.
    ForeignExport {
        name: Name,
        value: ExprId,
    },
    /// Coercion point: its own type is independent of its operand's.
    Convert(ExprId),
    /// Placeholder produced during error recovery.
    Undefined,
}

/// Function parameter. Unannotated parameters take their type from use.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Name,
    pub name_span: Span,
    pub ann: Option<TypeAnn>,
}

/// Syntactic type name; the checker resolves it against the builtins.
#[derive(Debug, Clone, Copy)]
pub struct TypeAnn {
    pub name: Name,
    pub span: Span,
}

/// One `if`/`or` arm of a branch.
#[derive(Debug, Clone)]
pub struct Arm {
    pub condition: ExprId,
    pub body: ExprId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Xor,
    Rem,
    Eq,
    Gt,
    Lt,
}

impl BinOp {
    /// Comparisons produce `bool`; every other operator keeps its operand
    /// type.
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Gt | BinOp::Lt)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Xor => "^",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
        }
    }
}
