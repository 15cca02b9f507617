use crate::constraints::{Constraints, VarKind};
use crate::error::CompileError;
use crate::types::{Ty, TypeVar};
use tarn_lexer::Span;

/// Mapping from type variables to monotypes. `apply` chases bindings all
/// the way down, so the mapping handed to consumers is idempotent:
/// applying it twice is the same as applying it once.
#[derive(Debug, Default)]
pub struct Substitution {
    slots: Vec<Option<Ty>>,
}

impl Substitution {
    /// Replace every bound variable in `ty`, recursively.
    pub fn apply(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::Var(var) => match self.slots.get(*var as usize) {
                Some(Some(bound)) => self.apply(bound),
                _ => ty.clone(),
            },
            Ty::Fn(params, ret) => Ty::Fn(
                params.iter().map(|p| self.apply(p)).collect(),
                Box::new(self.apply(ret)),
            ),
            _ => ty.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn bind(&mut self, var: TypeVar, ty: Ty) {
        self.slots[var as usize] = Some(ty);
    }
}

/// Resolve the accumulated constraints, in insertion order, into a
/// substitution. Failures are recorded and solving proceeds with the
/// bindings made so far, so one run can report several independent errors.
/// Variables still free afterwards default by literal origin: `i32` for
/// integer literals, `f64` for float literals.
pub(crate) fn solve(constraints: &Constraints, errors: &mut Vec<CompileError>) -> Substitution {
    let mut subst = Substitution {
        slots: vec![None; constraints.kinds.len()],
    };
    let mut kinds = constraints.kinds.clone();

    for equal in &constraints.equals {
        unify(&equal.left, &equal.right, equal.span, &mut subst, &mut kinds, errors);
    }

    default_numeric_vars(&mut subst, &kinds);
    subst
}

fn unify(
    a: &Ty,
    b: &Ty,
    span: Span,
    subst: &mut Substitution,
    kinds: &mut [VarKind],
    errors: &mut Vec<CompileError>,
) {
    let a = subst.apply(a);
    let b = subst.apply(b);

    if a == b {
        return;
    }

    match (&a, &b) {
        (Ty::Var(var), _) => bind_var(*var, &b, span, subst, kinds, errors),
        (_, Ty::Var(var)) => bind_var(*var, &a, span, subst, kinds, errors),

        (Ty::Fn(p1, r1), Ty::Fn(p2, r2)) => {
            if p1.len() != p2.len() {
                errors.push(CompileError::ArityMismatch {
                    expected: p1.len(),
                    found: p2.len(),
                    span,
                });
                return;
            }
            for (x, y) in p1.iter().zip(p2.iter()) {
                unify(x, y, span, subst, kinds, errors);
            }
            unify(r1, r2, span, subst, kinds, errors);
        }

        _ => errors.push(CompileError::TypeMismatch {
            expected: a.clone(),
            found: b.clone(),
            span,
        }),
    }
}

/// Bind `var` to `ty`. `ty` is already fully applied, so the occurs check
/// is a plain structural walk.
fn bind_var(
    var: TypeVar,
    ty: &Ty,
    span: Span,
    subst: &mut Substitution,
    kinds: &mut [VarKind],
    errors: &mut Vec<CompileError>,
) {
    if occurs_in(var, ty) {
        errors.push(CompileError::InfiniteType {
            var,
            ty: ty.clone(),
            span,
        });
        return;
    }

    if let Ty::Var(other) = ty {
        // variable-variable binding: the target becomes the
        // representative, so it inherits a literal-origin kind
        match (kinds[var as usize], kinds[*other as usize]) {
            (VarKind::IntLit, VarKind::FloatLit) => {
                errors.push(CompileError::TypeMismatch {
                    expected: Ty::I32,
                    found: Ty::F64,
                    span,
                });
                return;
            }
            (VarKind::FloatLit, VarKind::IntLit) => {
                errors.push(CompileError::TypeMismatch {
                    expected: Ty::F64,
                    found: Ty::I32,
                    span,
                });
                return;
            }
            (kind, VarKind::General) => kinds[*other as usize] = kind,
            _ => {}
        }
        subst.bind(var, ty.clone());
        return;
    }

    // a literal-origin variable only takes a type of its own family
    let compatible = match kinds[var as usize] {
        VarKind::General => true,
        VarKind::IntLit => ty.is_integer(),
        VarKind::FloatLit => ty.is_float(),
    };
    if !compatible {
        let expected = match kinds[var as usize] {
            VarKind::FloatLit => Ty::F64,
            _ => Ty::I32,
        };
        errors.push(CompileError::TypeMismatch {
            expected,
            found: ty.clone(),
            span,
        });
        return;
    }

    subst.bind(var, ty.clone());
}

fn occurs_in(var: TypeVar, ty: &Ty) -> bool {
    match ty {
        Ty::Var(other) => *other == var,
        Ty::Fn(params, ret) => params.iter().any(|p| occurs_in(var, p)) || occurs_in(var, ret),
        _ => false,
    }
}

/// Post-solve defaulting, in literal-site order (variable ids are minted
/// in source order). Hindley–Milner has no such rule; the WebAssembly
/// backend needs every literal to land on a concrete value type.
fn default_numeric_vars(subst: &mut Substitution, kinds: &[VarKind]) {
    for (i, kind) in kinds.iter().enumerate() {
        if subst.slots[i].is_none() {
            match kind {
                VarKind::IntLit => subst.slots[i] = Some(Ty::I32),
                VarKind::FloatLit => subst.slots[i] = Some(Ty::F64),
                VarKind::General => {}
            }
        }
    }
}
