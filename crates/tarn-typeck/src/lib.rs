mod constraints;
mod error;
mod scope;
mod solve;
#[cfg(test)]
mod tests;
mod types;

pub use constraints::{Constraints, Equal};
pub use error::CompileError;
pub use scope::Binding;
pub use solve::Substitution;
pub use types::{Ty, TypeVar};

use la_arena::ArenaMap;
use scope::Scopes;
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use tarn_ast::{self as ast, ExprId, Module};
use tarn_lexer::{Builtins, Interner, Name, Position, Span};

// ── Result ───────────────────────────────────────────────────────

/// Solved signature of one top-level function.
#[derive(Clone, Debug, PartialEq)]
pub struct FnType {
    pub params: Vec<Ty>,
    pub ret: Ty,
}

/// Everything inference learned about a module. After a clean check no
/// type in here contains an inference variable.
pub struct CheckResult {
    pub errors: Vec<CompileError>,
    /// Monotype of every inferred expression, after solving and
    /// defaulting.
    pub expr_types: ArenaMap<ExprId, Ty>,
    /// Resolved `global` flag of every symbol expression.
    pub symbol_globals: ArenaMap<ExprId, bool>,
    /// Solved signature of each function-valued top-level definition.
    pub fn_types: HashMap<Name, FnType>,
    /// Topological inference order over the top-level names reachable
    /// from the exports.
    pub order: Vec<Name>,
    /// Names surfaced to the host.
    pub exports: Vec<Name>,
    /// The final substitution; idempotent.
    pub substitution: Substitution,
}

// ── Driver ───────────────────────────────────────────────────────

/// Type-check a module. `exports` names the foreign exports; an empty
/// list means the single implicit export `start`. Exported definitions
/// are wrapped in `foreign_export` nodes so later stages can see them.
pub fn check(
    module: &mut Module,
    interner: &Interner,
    builtins: &Builtins,
    exports: &[Name],
) -> CheckResult {
    let exports: Vec<Name> = if exports.is_empty() {
        vec![builtins.start]
    } else {
        exports.to_vec()
    };
    wrap_exports(module, &exports);

    let mut errors = Vec::new();
    let order = dependency_order(module, &exports, interner, &mut errors);

    let mut checker = Checker::new(module, interner, builtins);
    checker.errors = errors;
    for &name in &order {
        checker.infer_top(name);
    }
    for &name in &exports {
        if module.def(name).is_none() {
            let origin = Span::new(Position::new(1, 1), Position::new(1, 1));
            checker.errors.push(CompileError::UnknownSymbol {
                name: SmolStr::new(interner.lookup(name)),
                span: origin,
            });
        }
    }

    let Checker {
        constraints,
        scopes,
        mut errors,
        expr_types,
        symbol_globals,
        typed,
        ..
    } = checker;

    let substitution = solve::solve(&constraints, &mut errors);

    // rewrite every inferred node with the final substitution
    let mut applied_types = ArenaMap::default();
    for (id, ty) in expr_types.iter() {
        applied_types.insert(id, substitution.apply(ty));
    }

    let mut fn_types = HashMap::new();
    for def in &module.defs {
        if !typed.contains(&def.name) {
            continue;
        }
        if let Some(binding) = scopes.lookup(def.name) {
            if let Ty::Fn(params, ret) = substitution.apply(&binding.ty) {
                fn_types.insert(
                    def.name,
                    FnType {
                        params,
                        ret: *ret,
                    },
                );
            }
        }
    }

    // a foreign import nothing ever called has no type to pin it down
    for def in &module.defs {
        if !typed.contains(&def.name) {
            continue;
        }
        let value = unwrap_export(module, def.value);
        if let ast::ExprKind::ForeignImport { module: m, name } = module.exprs[value].kind {
            if let Some(ty) = applied_types.get(value) {
                // a call site would at least have pinned a function shape
                if matches!(ty, Ty::Var(_)) {
                    errors.push(CompileError::UnusedForeignImport {
                        module: SmolStr::new(interner.lookup(m)),
                        name: SmolStr::new(interner.lookup(name)),
                        span: module.exprs[value].span,
                    });
                }
            }
        }
    }

    CheckResult {
        errors,
        expr_types: applied_types,
        symbol_globals,
        fn_types,
        order,
        exports,
        substitution,
    }
}

/// Wrap each exported definition's value in a `foreign_export` marker.
fn wrap_exports(module: &mut Module, exports: &[Name]) {
    for i in 0..module.defs.len() {
        let def = &module.defs[i];
        if !exports.contains(&def.name) {
            continue;
        }
        if matches!(
            module.exprs[def.value].kind,
            ast::ExprKind::ForeignExport { .. }
        ) {
            continue;
        }
        let (name, value, span) = (def.name, def.value, def.span);
        let wrapped = module.alloc(ast::ExprKind::ForeignExport { name, value }, span);
        module.defs[i].value = wrapped;
    }
}

/// Look through a `foreign_export` wrapper to the definition's value.
fn unwrap_export(module: &Module, value: ExprId) -> ExprId {
    match module.exprs[value].kind {
        ast::ExprKind::ForeignExport { value, .. } => value,
        _ => value,
    }
}

// ── Dependency order ─────────────────────────────────────────────

/// Depth-first topological order over top-level references, rooted at the
/// exports. Reference cycles are legal among functions (recursion, broken
/// by pre-binding) but meaningless for plain values; those are reported
/// as recursive value definitions.
fn dependency_order(
    module: &Module,
    exports: &[Name],
    interner: &Interner,
    errors: &mut Vec<CompileError>,
) -> Vec<Name> {
    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut path = Vec::new();
    let mut reported = HashSet::new();
    for &name in exports {
        visit(
            module, name, interner, &mut path, &mut done, &mut order, &mut reported, errors,
        );
    }
    order
}

#[allow(clippy::too_many_arguments)]
fn visit(
    module: &Module,
    name: Name,
    interner: &Interner,
    path: &mut Vec<Name>,
    done: &mut HashSet<Name>,
    order: &mut Vec<Name>,
    reported: &mut HashSet<Name>,
    errors: &mut Vec<CompileError>,
) {
    if done.contains(&name) {
        return;
    }
    let Some(def) = module.def(name) else {
        // unknown names surface during inference
        return;
    };
    if let Some(start) = path.iter().position(|&n| n == name) {
        let cycle = &path[start..];
        if let Some(&bad) = cycle.iter().find(|&&n| !is_function_value(module, n)) {
            if reported.insert(bad) {
                errors.push(CompileError::RecursiveValue {
                    name: SmolStr::new(interner.lookup(bad)),
                });
            }
        }
        return;
    }

    path.push(name);
    let mut refs = Vec::new();
    collect_refs(module, unwrap_export(module, def.value), &mut refs);
    for referenced in refs {
        if module.def(referenced).is_some() {
            visit(
                module, referenced, interner, path, done, order, reported, errors,
            );
        }
    }
    path.pop();

    done.insert(name);
    order.push(name);
}

fn is_function_value(module: &Module, name: Name) -> bool {
    let Some(def) = module.def(name) else {
        return false;
    };
    matches!(
        module.exprs[unwrap_export(module, def.value)].kind,
        ast::ExprKind::Function { .. } | ast::ExprKind::ForeignImport { .. }
    )
}

/// Every symbol referenced under `id`, syntactically.
fn collect_refs(module: &Module, id: ExprId, out: &mut Vec<Name>) {
    match &module.exprs[id].kind {
        ast::ExprKind::Symbol(name) => out.push(*name),
        ast::ExprKind::Int(_)
        | ast::ExprKind::Float(_)
        | ast::ExprKind::Bool(_)
        | ast::ExprKind::Str(_)
        | ast::ExprKind::ForeignImport { .. }
        | ast::ExprKind::Undefined => {}
        ast::ExprKind::Define { value, .. } | ast::ExprKind::ForeignExport { value, .. } => {
            collect_refs(module, *value, out)
        }
        ast::ExprKind::PlusEqual { name, value, .. }
        | ast::ExprKind::TimesEqual { name, value, .. } => {
            out.push(*name);
            collect_refs(module, *value, out);
        }
        ast::ExprKind::Drop(value) | ast::ExprKind::Convert(value) => {
            collect_refs(module, *value, out)
        }
        ast::ExprKind::Function { body, .. } => collect_refs(module, *body, out),
        ast::ExprKind::Binary { lhs, rhs, .. } => {
            collect_refs(module, *lhs, out);
            collect_refs(module, *rhs, out);
        }
        ast::ExprKind::Group(exprs) | ast::ExprKind::Block(exprs) => {
            for &e in exprs {
                collect_refs(module, e, out);
            }
        }
        ast::ExprKind::Branch { arms, else_body } => {
            for arm in arms {
                collect_refs(module, arm.condition, out);
                collect_refs(module, arm.body, out);
            }
            collect_refs(module, *else_body, out);
        }
        ast::ExprKind::Call { callee, args } => {
            collect_refs(module, *callee, out);
            for &a in args {
                collect_refs(module, a, out);
            }
        }
        ast::ExprKind::Intrinsic { args, .. } => {
            for &a in args {
                collect_refs(module, a, out);
            }
        }
    }
}

// ── Inference ────────────────────────────────────────────────────

/// Inference of the current top level hit a fatal local error; the error
/// is already recorded and the driver moves on to the next definition.
struct Aborted;

struct Checker<'a> {
    module: &'a Module,
    interner: &'a Interner,
    builtins: &'a Builtins,
    constraints: Constraints,
    scopes: Scopes,
    errors: Vec<CompileError>,
    expr_types: ArenaMap<ExprId, Ty>,
    symbol_globals: ArenaMap<ExprId, bool>,
    /// Top-level names whose inference has run (memoization).
    typed: HashSet<Name>,
}

impl<'a> Checker<'a> {
    fn new(module: &'a Module, interner: &'a Interner, builtins: &'a Builtins) -> Self {
        Self {
            module,
            interner,
            builtins,
            constraints: Constraints::new(),
            scopes: Scopes::new(),
            errors: Vec::new(),
            expr_types: ArenaMap::default(),
            symbol_globals: ArenaMap::default(),
            typed: HashSet::new(),
        }
    }

    /// Infer one top-level definition. The name is bound to a fresh
    /// variable before its value is entered, so recursive references
    /// resolve through the scope instead of re-entering inference.
    fn infer_top(&mut self, name: Name) {
        if self.typed.contains(&name) {
            return;
        }
        let module = self.module;
        let Some(def) = module.def(name) else {
            return;
        };
        self.typed.insert(name);
        self.scopes.clear_locals();

        let ty = self.constraints.fresh();
        self.scopes.insert_global(
            name,
            Binding {
                ty: ty.clone(),
                global: true,
                mutable: false,
            },
        );

        // an exported definition binds the wrapped value's type; the
        // wrapper itself is void
        let (value, wrapper) = match module.exprs[def.value].kind {
            ast::ExprKind::ForeignExport { value, .. } => (value, Some(def.value)),
            _ => (def.value, None),
        };
        let Ok(value_ty) = self.infer_expr(value) else {
            return;
        };
        if let Some(wrapper) = wrapper {
            self.expr_types.insert(wrapper, Ty::Void);
        }
        self.constraints.equate(ty, value_ty, def.span);
    }

    fn infer_expr(&mut self, id: ExprId) -> Result<Ty, Aborted> {
        let module = self.module;
        let expr = &module.exprs[id];
        let ty = match &expr.kind {
            ast::ExprKind::Int(_) => self.constraints.fresh_int(),
            ast::ExprKind::Float(_) => self.constraints.fresh_float(),
            ast::ExprKind::Bool(_) => Ty::Bool,
            ast::ExprKind::Str(_) => Ty::Str,

            ast::ExprKind::Symbol(name) => match self.scopes.lookup(*name) {
                Some(binding) => {
                    let ty = binding.ty.clone();
                    let global = binding.global;
                    self.symbol_globals.insert(id, global);
                    ty
                }
                None => return Err(self.unknown_symbol(*name, expr.span)),
            },

            ast::ExprKind::Define {
                name,
                value,
                mutable,
                ..
            } => {
                let value_ty = self.infer_expr(*value)?;
                self.scopes.insert(
                    *name,
                    Binding {
                        ty: value_ty,
                        global: false,
                        mutable: *mutable,
                    },
                );
                Ty::Void
            }

            ast::ExprKind::Drop(value) => {
                self.infer_expr(*value)?;
                Ty::Void
            }

            ast::ExprKind::PlusEqual {
                name,
                name_span,
                value,
            }
            | ast::ExprKind::TimesEqual {
                name,
                name_span,
                value,
            } => {
                let binding = match self.scopes.lookup(*name) {
                    Some(binding) => binding.clone(),
                    None => return Err(self.unknown_symbol(*name, *name_span)),
                };
                if !binding.mutable {
                    self.errors.push(CompileError::AssignToImmutable {
                        name: self.resolve(*name),
                        span: expr.span,
                    });
                    return Err(Aborted);
                }
                let value_ty = self.infer_expr(*value)?;
                self.constraints.equate(binding.ty, value_ty, expr.span);
                Ty::Void
            }

            ast::ExprKind::Block(stmts) => {
                self.scopes.push();
                let mut last = Ty::Void;
                for &stmt in stmts {
                    last = self.infer_expr(stmt)?;
                }
                self.scopes.pop();
                last
            }

            ast::ExprKind::Group(exprs) => {
                let mut last = Ty::Void;
                for &e in exprs {
                    last = self.infer_expr(e)?;
                }
                last
            }

            ast::ExprKind::Function {
                params,
                return_ann,
                body,
            } => {
                self.scopes.push();
                let mut param_tys = Vec::with_capacity(params.len());
                for param in params {
                    let ty = self.constraints.fresh();
                    if let Some(ann) = param.ann {
                        let ann_ty = self.resolve_type(ann)?;
                        self.constraints.equate(ty.clone(), ann_ty, ann.span);
                    }
                    self.scopes.insert(
                        param.name,
                        Binding {
                            ty: ty.clone(),
                            global: false,
                            mutable: true,
                        },
                    );
                    param_tys.push(ty);
                }
                let body_ty = self.infer_expr(*body)?;
                let ret = match return_ann {
                    Some(ann) => self.resolve_type(*ann)?,
                    None => self.constraints.fresh(),
                };
                self.constraints
                    .equate(ret.clone(), body_ty, module.exprs[*body].span);
                self.scopes.pop();
                Ty::Fn(param_tys, Box::new(ret))
            }

            ast::ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.infer_expr(*lhs)?;
                let rhs_ty = self.infer_expr(*rhs)?;
                self.constraints.equate(lhs_ty.clone(), rhs_ty, expr.span);
                if op.is_comparison() {
                    Ty::Bool
                } else {
                    lhs_ty
                }
            }

            ast::ExprKind::Branch { arms, else_body } => {
                let result = self.constraints.fresh();
                for arm in arms {
                    let cond_ty = self.infer_expr(arm.condition)?;
                    self.constraints
                        .equate(cond_ty, Ty::Bool, module.exprs[arm.condition].span);
                    let body_ty = self.infer_expr(arm.body)?;
                    self.constraints
                        .equate(result.clone(), body_ty, module.exprs[arm.body].span);
                }
                let else_ty = self.infer_expr(*else_body)?;
                self.constraints
                    .equate(result.clone(), else_ty, module.exprs[*else_body].span);
                result
            }

            ast::ExprKind::Call { callee, args } => {
                let callee_ty = self.infer_expr(*callee)?;
                let mut arg_tys = Vec::with_capacity(args.len());
                for &arg in args {
                    arg_tys.push(self.infer_expr(arg)?);
                }
                let ret = self.constraints.fresh();
                self.constraints.equate(
                    callee_ty,
                    Ty::Fn(arg_tys, Box::new(ret.clone())),
                    expr.span,
                );
                ret
            }

            ast::ExprKind::Intrinsic { name, args } => {
                let Some((params, ret)) = self.intrinsic_signature(*name) else {
                    return Err(self.unknown_symbol(*name, expr.span));
                };
                if args.len() != params.len() {
                    self.errors.push(CompileError::ArityMismatch {
                        expected: params.len(),
                        found: args.len(),
                        span: expr.span,
                    });
                    return Err(Aborted);
                }
                for (&arg, param) in args.iter().zip(params) {
                    let arg_ty = self.infer_expr(arg)?;
                    self.constraints
                        .equate(arg_ty, param, module.exprs[arg].span);
                }
                ret
            }

            ast::ExprKind::Convert(value) => {
                self.infer_expr(*value)?;
                self.constraints.fresh()
            }

            // pinned only by use-site constraints
            ast::ExprKind::ForeignImport { .. } => self.constraints.fresh(),

            ast::ExprKind::ForeignExport { value, .. } => {
                self.infer_expr(*value)?;
                Ty::Void
            }

            ast::ExprKind::Undefined => self.constraints.fresh(),
        };

        self.expr_types.insert(id, ty.clone());
        Ok(ty)
    }

    /// Resolve a syntactic type name against the builtins, by handle
    /// equality.
    fn resolve_type(&mut self, ann: ast::TypeAnn) -> Result<Ty, Aborted> {
        let b = self.builtins;
        let ty = if ann.name == b.ty_i32 {
            Ty::I32
        } else if ann.name == b.ty_i64 {
            Ty::I64
        } else if ann.name == b.ty_f32 {
            Ty::F32
        } else if ann.name == b.ty_f64 {
            Ty::F64
        } else if ann.name == b.ty_bool {
            Ty::Bool
        } else if ann.name == b.ty_string {
            Ty::Str
        } else if ann.name == b.ty_void {
            Ty::Void
        } else {
            return Err(self.unknown_symbol(ann.name, ann.span));
        };
        Ok(ty)
    }

    /// Signature of a builtin primitive. The conversions take their target
    /// type and the coercion happens in the wrapped `convert` operand.
    fn intrinsic_signature(&self, name: Name) -> Option<(Vec<Ty>, Ty)> {
        let b = self.builtins;
        let target = if name == b.ty_i32 {
            Ty::I32
        } else if name == b.ty_i64 {
            Ty::I64
        } else if name == b.ty_f32 {
            Ty::F32
        } else if name == b.ty_f64 {
            Ty::F64
        } else {
            return None;
        };
        Some((vec![target.clone()], target))
    }

    fn resolve(&self, name: Name) -> SmolStr {
        SmolStr::new(self.interner.lookup(name))
    }

    fn unknown_symbol(&mut self, name: Name, span: Span) -> Aborted {
        let name = self.resolve(name);
        self.errors.push(CompileError::UnknownSymbol { name, span });
        Aborted
    }
}
