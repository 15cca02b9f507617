use super::*;
use tarn_ast::{Def, ExprKind};
use tarn_lexer::tokenize;

fn run(source: &str, exports: &[&str]) -> (Module, CheckResult, Interner) {
    let (tokens, mut interner) = tokenize(source);
    let builtins = Builtins::new(&mut interner);
    let (mut module, parse_errors) = tarn_parser::parse(&tokens, &builtins);
    assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
    let export_names: Vec<Name> = exports.iter().map(|e| interner.store(e)).collect();
    let result = check(&mut module, &interner, &builtins, &export_names);
    (module, result, interner)
}

fn check_ok(source: &str) -> (Module, CheckResult, Interner) {
    let (module, result, interner) = run(source, &[]);
    assert!(
        result.errors.is_empty(),
        "unexpected errors: {:?}",
        result.errors
    );
    (module, result, interner)
}

fn check_err(source: &str) -> Vec<CompileError> {
    let (_, result, _) = run(source, &[]);
    assert!(!result.errors.is_empty(), "expected errors, got none");
    result.errors
}

fn find_expr(module: &Module, pred: impl Fn(&ExprKind) -> bool) -> ExprId {
    module
        .exprs
        .iter()
        .find(|(_, e)| pred(&e.kind))
        .map(|(id, _)| id)
        .expect("no matching expression")
}

fn dummy_span() -> Span {
    Span::new(Position::new(1, 1), Position::new(1, 1))
}

// ── End-to-end scenarios ─────────────────────────────────────────

#[test]
fn identity_function_with_default_numeric_typing() {
    let (module, result, mut interner) = check_ok("start = fn() i32 { 42 }");
    let lit = find_expr(&module, |k| matches!(k, ExprKind::Int(_)));
    assert_eq!(result.expr_types[lit], Ty::I32);

    let start = interner.store("start");
    assert_eq!(
        result.fn_types[&start],
        FnType {
            params: Vec::new(),
            ret: Ty::I32,
        }
    );
    assert_eq!(result.exports, vec![start]);
}

#[test]
fn branch_unifies_both_arms() {
    let (module, result, _) = check_ok("start = fn() i32 { if true { 1 } else { 2 } }");
    let branch = find_expr(&module, |k| matches!(k, ExprKind::Branch { .. }));
    assert_eq!(result.expr_types[branch], Ty::I32);
    for (id, expr) in module.exprs.iter() {
        if matches!(expr.kind, ExprKind::Int(_)) {
            assert_eq!(result.expr_types[id], Ty::I32);
        }
    }
}

#[test]
fn mutable_accumulation() {
    let (module, result, _) = check_ok("start = fn() i32 { x = 0\n x += 1\n x }");
    let define = find_expr(&module, |k| matches!(k, ExprKind::Define { .. }));
    assert_eq!(result.expr_types[define], Ty::Void);
    let assign = find_expr(&module, |k| matches!(k, ExprKind::PlusEqual { .. }));
    assert_eq!(result.expr_types[assign], Ty::Void);
    let sym = find_expr(&module, |k| matches!(k, ExprKind::Symbol(_)));
    assert_eq!(result.expr_types[sym], Ty::I32);
    let block = find_expr(&module, |k| matches!(k, ExprKind::Block(_)));
    assert_eq!(result.expr_types[block], Ty::I32);
}

#[test]
fn assignment_to_global_is_immutable() {
    let errors = check_err("g = fn() i32 { 1 }\nstart = fn() i32 { g += 1\n 0 }");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, CompileError::AssignToImmutable { name, .. } if name == "g")),
        "expected AssignToImmutable, got {:?}",
        errors
    );
}

#[test]
fn assignment_to_immutable_local_errors() {
    // built by hand: the surface syntax only produces mutable locals
    let mut interner = Interner::new();
    let builtins = Builtins::new(&mut interner);
    let mut module = Module::new();
    let span = dummy_span();
    let x = interner.store("x");

    let zero = module.alloc(ExprKind::Int(interner.store("0")), span);
    let define = module.alloc(
        ExprKind::Define {
            name: x,
            name_span: span,
            value: zero,
            mutable: false,
        },
        span,
    );
    let one = module.alloc(ExprKind::Int(interner.store("1")), span);
    let assign = module.alloc(
        ExprKind::PlusEqual {
            name: x,
            name_span: span,
            value: one,
        },
        span,
    );
    let sym = module.alloc(ExprKind::Symbol(x), span);
    let body = module.alloc(ExprKind::Block(vec![define, assign, sym]), span);
    let func = module.alloc(
        ExprKind::Function {
            params: Vec::new(),
            return_ann: None,
            body,
        },
        span,
    );
    module.defs.push(Def {
        name: builtins.start,
        name_span: span,
        value: func,
        span,
    });

    let result = check(&mut module, &interner, &builtins, &[]);
    assert!(
        result
            .errors
            .iter()
            .any(|e| matches!(e, CompileError::AssignToImmutable { name, .. } if name == "x")),
        "expected AssignToImmutable, got {:?}",
        result.errors
    );
}

#[test]
fn mismatched_branch_arms() {
    let errors = check_err(r#"start = fn() i32 { if true { 1 } else { "hi" } }"#);
    assert_eq!(errors.len(), 1);
    assert!(
        matches!(
            &errors[0],
            CompileError::TypeMismatch {
                expected: Ty::I32,
                found: Ty::Str,
                ..
            }
        ),
        "got {:?}",
        errors
    );
}

#[test]
fn call_with_wrong_arity() {
    let errors = check_err("f = fn(a i32) i32 { a }\nstart = fn() i32 { f(1, 2) }");
    assert!(
        errors.iter().any(|e| matches!(
            e,
            CompileError::ArityMismatch {
                expected: 1,
                found: 2,
                ..
            }
        )),
        "expected ArityMismatch, got {:?}",
        errors
    );
}

// ── Resolution and ordering ──────────────────────────────────────

#[test]
fn unknown_symbol_aborts_the_definition() {
    let errors = check_err("start = fn() i32 { nope }");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, CompileError::UnknownSymbol { name, .. } if name == "nope")),
        "got {:?}",
        errors
    );
}

#[test]
fn missing_implicit_export_is_reported() {
    let errors = check_err("f = fn() i32 { 1 }");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, CompileError::UnknownSymbol { name, .. } if name == "start")),
        "got {:?}",
        errors
    );
}

#[test]
fn recursion_through_functions_is_legal() {
    let (_, result, mut interner) = check_ok(
        "fact = fn(n i32) i32 { if n < 2 { 1 } else { n * fact(n - 1) } }\n\
         start = fn() i32 { fact(5) }",
    );
    let fact = interner.store("fact");
    let start = interner.store("start");
    // dependencies come before their dependents
    assert_eq!(result.order, vec![fact, start]);
    assert_eq!(result.fn_types[&fact].params, vec![Ty::I32]);
}

#[test]
fn recursive_plain_values_are_rejected() {
    let errors = check_err("start = fn() i32 { a }\na = b\nb = a");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, CompileError::RecursiveValue { name } if name == "a")),
        "expected RecursiveValue, got {:?}",
        errors
    );
}

#[test]
fn global_references_are_marked_global() {
    let (module, result, _) =
        check_ok("one = fn() i32 { 1 }\nstart = fn() i32 { x = 2\n one() + x }");
    for (id, expr) in module.exprs.iter() {
        if let ExprKind::Symbol(_) = expr.kind {
            let global = result.symbol_globals[id];
            // `one` resolves globally, `x` locally
            match result.expr_types[id] {
                Ty::Fn(..) => assert!(global),
                _ => assert!(!global),
            }
        }
    }
}

#[test]
fn explicit_exports_drive_inference() {
    let (_, result, mut interner) =
        run("f = fn() i32 { 1 }\ng = fn() f64 { 2.5 }", &["f", "g"]);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let f = interner.store("f");
    let g = interner.store("g");
    assert_eq!(result.exports, vec![f, g]);
    assert_eq!(result.fn_types[&f].ret, Ty::I32);
    assert_eq!(result.fn_types[&g].ret, Ty::F64);
}

#[test]
fn unexported_definitions_are_not_inferred() {
    let (_, result, mut interner) =
        check_ok("start = fn() i32 { 1 }\nunused = fn() i32 { 2 }");
    let unused = interner.store("unused");
    assert!(!result.order.contains(&unused));
    assert!(!result.fn_types.contains_key(&unused));
}

// ── Defaulting ───────────────────────────────────────────────────

#[test]
fn unconstrained_int_defaults_to_i32() {
    let (_, result, mut interner) = check_ok("start = fn() { 42 }");
    let start = interner.store("start");
    assert_eq!(result.fn_types[&start].ret, Ty::I32);
}

#[test]
fn unconstrained_float_defaults_to_f64() {
    let (_, result, mut interner) = check_ok("start = fn() { 2.5 }");
    let start = interner.store("start");
    assert_eq!(result.fn_types[&start].ret, Ty::F64);
}

#[test]
fn annotation_pins_a_literal_before_defaulting() {
    let (module, result, _) = check_ok("start = fn() i64 { 42 }");
    let lit = find_expr(&module, |k| matches!(k, ExprKind::Int(_)));
    assert_eq!(result.expr_types[lit], Ty::I64);

    let (module, result, _) = check_ok("start = fn() f32 { 1.5 }");
    let lit = find_expr(&module, |k| matches!(k, ExprKind::Float(_)));
    assert_eq!(result.expr_types[lit], Ty::F32);
}

#[test]
fn integer_literal_rejects_a_float_type() {
    let errors = check_err("start = fn() f64 { 42 }");
    assert!(
        errors.iter().any(|e| matches!(
            e,
            CompileError::TypeMismatch {
                expected: Ty::I32,
                found: Ty::F64,
                ..
            }
        )),
        "got {:?}",
        errors
    );
}

#[test]
fn float_accumulation() {
    let (module, result, _) = check_ok("start = fn() f64 { x = 1.5\n x *= 2.0\n x }");
    let sym = find_expr(&module, |k| matches!(k, ExprKind::Symbol(_)));
    assert_eq!(result.expr_types[sym], Ty::F64);
}

// ── Conversions ──────────────────────────────────────────────────

#[test]
fn conversion_pins_its_own_type_not_its_operand() {
    let (module, result, _) = check_ok("start = fn() i64 { i64(7) }");
    let intrinsic = find_expr(&module, |k| matches!(k, ExprKind::Intrinsic { .. }));
    assert_eq!(result.expr_types[intrinsic], Ty::I64);
    let convert = find_expr(&module, |k| matches!(k, ExprKind::Convert(_)));
    assert_eq!(result.expr_types[convert], Ty::I64);
    // the operand is an independent literal; nothing pins it past i32
    let lit = find_expr(&module, |k| matches!(k, ExprKind::Int(_)));
    assert_eq!(result.expr_types[lit], Ty::I32);
}

#[test]
fn conversion_between_float_widths() {
    let (module, result, _) = check_ok("half = fn(x f64) f32 { f32(x / 2.0) }\n\
                                        start = fn() f32 { half(3.0) }");
    let convert = find_expr(&module, |k| matches!(k, ExprKind::Convert(_)));
    assert_eq!(result.expr_types[convert], Ty::F32);
}

// ── Foreign imports and exports ──────────────────────────────────

#[test]
fn foreign_import_is_typed_at_its_call_sites() {
    let (module, result, _) =
        check_ok("print = env.print\nstart = fn() i32 { print(7)\n 0 }");
    let import = find_expr(&module, |k| matches!(k, ExprKind::ForeignImport { .. }));
    let Ty::Fn(params, _) = &result.expr_types[import] else {
        panic!("import should have a function shape");
    };
    assert_eq!(params, &vec![Ty::I32]);
}

#[test]
fn unused_foreign_import_is_diagnosed() {
    let (_, result, _) = run("log = env.print\nstart = fn() i32 { log\n 0 }", &[]);
    assert!(
        result.errors.iter().any(|e| matches!(
            e,
            CompileError::UnusedForeignImport { module, name, .. }
                if module == "env" && name == "print"
        )),
        "got {:?}",
        result.errors
    );
}

#[test]
fn exported_definitions_are_wrapped() {
    let (module, result, mut interner) = check_ok("start = fn() i32 { 0 }");
    let start = interner.store("start");
    let def = module.def(start).expect("start");
    let ExprKind::ForeignExport { value, .. } = module.exprs[def.value].kind else {
        panic!("export should be wrapped");
    };
    assert_eq!(result.expr_types[def.value], Ty::Void);
    assert!(matches!(result.expr_types[value], Ty::Fn(..)));
}

// ── Properties ───────────────────────────────────────────────────

#[test]
fn infinite_types_are_rejected() {
    let errors = check_err("start = fn() i32 { f = fn(x) { x(x) }\n 1 }");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, CompileError::InfiniteType { .. })),
        "expected InfiniteType, got {:?}",
        errors
    );
}

#[test]
fn solved_types_contain_no_variables() {
    let (_, result, _) = check_ok(
        "double = fn(n i32) i32 { n + n }\n\
         start = fn() i32 { x = 0\n x += double(21)\n if x > 21 { x } else { 0 } }",
    );
    for (_, ty) in result.expr_types.iter() {
        assert!(!ty.contains_var(), "free variable survived in {}", ty);
    }
}

#[test]
fn final_substitution_is_idempotent() {
    let (_, result, _) = check_ok(
        "double = fn(n i32) i32 { n + n }\n\
         start = fn() i32 { x = 0\n x += double(21)\n if x > 21 { x } else { 0 } }",
    );
    for (_, ty) in result.expr_types.iter() {
        assert_eq!(&result.substitution.apply(ty), ty);
    }
    for var in 0..result.substitution.len() as TypeVar {
        let once = result.substitution.apply(&Ty::Var(var));
        assert_eq!(result.substitution.apply(&once), once);
    }
}

#[test]
fn block_scopes_shadow_and_restore() {
    let (module, result, _) = check_ok(
        "start = fn() i32 { x = 1\n y = { x = \"inner\"\n 0 }\n x }",
    );
    // the trailing `x` sees the outer (integer) binding again
    let last_symbol = module
        .exprs
        .iter()
        .filter(|(_, e)| matches!(e.kind, ExprKind::Symbol(_)))
        .map(|(id, _)| id)
        .last()
        .expect("symbol");
    assert_eq!(result.expr_types[last_symbol], Ty::I32);
}

#[test]
fn empty_function_returns_void() {
    let (_, result, mut interner) = check_ok("start = fn() { }");
    let start = interner.store("start");
    assert_eq!(result.fn_types[&start].ret, Ty::Void);
}
