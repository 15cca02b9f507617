use std::fmt;

/// Inference variable identity, minted by the constraint store.
pub type TypeVar = u32;

/// A concrete type or an unresolved inference variable. There is no
/// generalization to polytypes in this language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ty {
    /// Only valid as a return type; no void value ever flows.
    Void,
    Bool,
    I32,
    I64,
    F32,
    F64,
    Str,
    /// Unresolved inference variable.
    Var(TypeVar),
    /// Function type. Parameter order is significant; zero parameters is
    /// permitted.
    Fn(Vec<Ty>, Box<Ty>),
    /// A foreign-imported module handle.
    Module,
}

impl Ty {
    pub(crate) fn is_integer(&self) -> bool {
        matches!(self, Ty::I32 | Ty::I64)
    }

    pub(crate) fn is_float(&self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    /// Whether any inference variable remains anywhere in this type.
    pub fn contains_var(&self) -> bool {
        match self {
            Ty::Var(_) => true,
            Ty::Fn(params, ret) => params.iter().any(Ty::contains_var) || ret.contains_var(),
            _ => false,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::Bool => write!(f, "bool"),
            Ty::I32 => write!(f, "i32"),
            Ty::I64 => write!(f, "i64"),
            Ty::F32 => write!(f, "f32"),
            Ty::F64 => write!(f, "f64"),
            Ty::Str => write!(f, "string"),
            Ty::Var(id) => write!(f, "?{}", id),
            Ty::Fn(params, ret) => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") {}", ret)
            }
            Ty::Module => write!(f, "module"),
        }
    }
}
