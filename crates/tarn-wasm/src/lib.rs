mod emit;
mod types;

use smol_str::SmolStr;
use std::collections::HashMap;
use tarn_ast::{self as ast, ExprId};
use tarn_lexer::{Interner, Name, Span};
use tarn_typeck::{CheckResult, CompileError, Ty};
use thiserror::Error;
use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection, Function,
    FunctionSection, ImportSection, Instruction, MemorySection, MemoryType, Module, TypeSection,
    ValType,
};

use types::{param_valtype, result_valtype, valtype};

/// Linear memory below this offset stays zero; string data starts here.
const STRING_BASE: u32 = 8;

// ── Error ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WasmError {
    /// A solved type with no WebAssembly representation.
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("malformed numeric literal `{text}`")]
    MalformedLiteral { text: SmolStr, span: Span },

    #[error("{message}")]
    Unsupported { message: String, span: Span },
}

impl WasmError {
    pub fn span(&self) -> Option<Span> {
        match self {
            WasmError::Compile(inner) => inner.span(),
            WasmError::MalformedLiteral { span, .. } | WasmError::Unsupported { span, .. } => {
                Some(*span)
            }
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>, span: Span) -> Self {
        WasmError::Unsupported {
            message: message.into(),
            span,
        }
    }
}

/// Compile a checked module to a WebAssembly binary. Expects a clean
/// check: every reachable expression carries a solved type.
pub fn compile(
    module: &ast::Module,
    info: &CheckResult,
    interner: &Interner,
) -> Result<Vec<u8>, WasmError> {
    WasmCompiler::new(module, info, interner).compile()
}

// ── Compiler ─────────────────────────────────────────────────────

struct WasmCompiler<'a> {
    module: &'a ast::Module,
    info: &'a CheckResult,
    interner: &'a Interner,

    // function index space: imports first, then defined functions
    func_indices: HashMap<Name, u32>,
    import_indices: HashMap<(Name, Name), u32>,
    next_func_index: u32,

    type_index_cache: HashMap<(Vec<ValType>, Vec<ValType>), u32>,
    next_type_index: u32,

    // per-function compilation state
    local_slots: HashMap<ExprId, u32>,
    scopes: Vec<HashMap<Name, Option<u32>>>,
    next_local: u32,
    extra_locals: Vec<ValType>,

    // string literals in linear memory
    string_data: Vec<u8>,
    string_offsets: HashMap<SmolStr, u32>,
}

impl<'a> WasmCompiler<'a> {
    fn new(module: &'a ast::Module, info: &'a CheckResult, interner: &'a Interner) -> Self {
        Self {
            module,
            info,
            interner,
            func_indices: HashMap::new(),
            import_indices: HashMap::new(),
            next_func_index: 0,
            type_index_cache: HashMap::new(),
            next_type_index: 0,
            local_slots: HashMap::new(),
            scopes: Vec::new(),
            next_local: 0,
            extra_locals: Vec::new(),
            string_data: Vec::new(),
            string_offsets: HashMap::new(),
        }
    }

    /// The solved type of an expression.
    fn expr_ty(&self, id: ExprId) -> Ty {
        self.info.expr_types.get(id).cloned().unwrap_or(Ty::Void)
    }

    fn text(&self, name: Name) -> &'a str {
        self.interner.lookup(name)
    }

    /// The definition's value with any `foreign_export` wrapper removed.
    fn export_value(&self, value: ExprId) -> ExprId {
        match self.module.exprs[value].kind {
            ast::ExprKind::ForeignExport { value, .. } => value,
            _ => value,
        }
    }

    /// Register or retrieve a function type index.
    fn func_type_index(
        &mut self,
        type_section: &mut TypeSection,
        params: Vec<ValType>,
        results: Vec<ValType>,
    ) -> u32 {
        let key = (params.clone(), results.clone());
        if let Some(&idx) = self.type_index_cache.get(&key) {
            return idx;
        }
        let idx = self.next_type_index;
        self.next_type_index += 1;
        type_section.ty().function(params, results);
        self.type_index_cache.insert(key, idx);
        idx
    }

    /// Intern a string literal in the data segment. Returns its linear
    /// memory offset. Stored null-terminated, 8-byte aligned.
    fn intern_string(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.string_offsets.get(s) {
            return offset;
        }
        let offset = STRING_BASE + self.string_data.len() as u32;
        self.string_data.extend_from_slice(s.as_bytes());
        self.string_data.push(0);
        while self.string_data.len() % 8 != 0 {
            self.string_data.push(0);
        }
        self.string_offsets.insert(SmolStr::new(s), offset);
        offset
    }

    fn reset_function_state(&mut self) {
        self.local_slots.clear();
        self.scopes.clear();
        self.next_local = 0;
        self.extra_locals.clear();
    }

    // ── Passes ───────────────────────────────────────────────────

    fn compile(mut self) -> Result<Vec<u8>, WasmError> {
        let mut type_section = TypeSection::new();
        let mut imports = ImportSection::new();
        let mut functions = FunctionSection::new();
        let mut memory = MemorySection::new();
        let mut exports = ExportSection::new();
        let mut code = CodeSection::new();
        let mut data = DataSection::new();

        // ── Pass 1: foreign imports take the low function indices ─

        let mut import_nodes = Vec::new();
        for &name in &self.info.order {
            if let Some(def) = self.module.def(name) {
                collect_imports(self.module, self.export_value(def.value), &mut import_nodes);
            }
        }
        for node in import_nodes {
            let ast::ExprKind::ForeignImport { module: m, name } = self.module.exprs[node].kind
            else {
                continue;
            };
            if self.import_indices.contains_key(&(m, name)) {
                continue;
            }
            let span = self.module.exprs[node].span;
            match self.expr_ty(node) {
                Ty::Fn(params, ret) => {
                    let param_vts = params
                        .iter()
                        .map(param_valtype)
                        .collect::<Result<Vec<_>, _>>()?;
                    let result_vts: Vec<ValType> =
                        result_valtype(&ret)?.into_iter().collect();
                    let type_idx = self.func_type_index(&mut type_section, param_vts, result_vts);
                    imports.import(
                        self.interner.lookup(m),
                        self.interner.lookup(name),
                        EntityType::Function(type_idx),
                    );
                    self.import_indices.insert((m, name), self.next_func_index);
                    self.next_func_index += 1;
                }
                // never called anywhere; the checker has diagnosed it
                Ty::Var(_) => {}
                other => {
                    return Err(WasmError::unsupported(
                        format!("foreign import used as a non-function value of type {}", other),
                        span,
                    ));
                }
            }
        }

        // ── Pass 2: declare defined functions ────────────────────

        let mut body_order: Vec<Name> = Vec::new();
        for &name in &self.info.order {
            let Some(def) = self.module.def(name) else {
                continue;
            };
            let value = self.export_value(def.value);
            match self.module.exprs[value].kind {
                ast::ExprKind::Function { .. } => {
                    let Some(sig) = self.info.fn_types.get(&name) else {
                        continue;
                    };
                    let param_vts = sig
                        .params
                        .iter()
                        .map(param_valtype)
                        .collect::<Result<Vec<_>, _>>()?;
                    let result_vts: Vec<ValType> =
                        result_valtype(&sig.ret)?.into_iter().collect();
                    let type_idx = self.func_type_index(&mut type_section, param_vts, result_vts);
                    functions.function(type_idx);
                    self.func_indices.insert(name, self.next_func_index);
                    self.next_func_index += 1;
                    body_order.push(name);
                }
                // a definition aliasing a host function
                ast::ExprKind::ForeignImport { module: m, name: field } => {
                    if let Some(&idx) = self.import_indices.get(&(m, field)) {
                        self.func_indices.insert(name, idx);
                    }
                }
                _ => {
                    return Err(WasmError::unsupported(
                        "top-level value is not a function",
                        def.span,
                    ));
                }
            }
        }

        // ── Pass 3: memory and exports ───────────────────────────

        memory.memory(MemoryType {
            minimum: 1,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        exports.export("memory", ExportKind::Memory, 0);
        for &name in &self.info.exports {
            if let Some(&idx) = self.func_indices.get(&name) {
                exports.export(self.interner.lookup(name), ExportKind::Func, idx);
            }
        }

        // ── Pass 4: compile function bodies ──────────────────────

        for name in body_order {
            let Some(def) = self.module.def(name) else {
                continue;
            };
            let value = self.export_value(def.value);
            let ast::ExprKind::Function { ref params, body, .. } = self.module.exprs[value].kind
            else {
                continue;
            };

            self.reset_function_state();
            let mut param_scope = HashMap::new();
            for (i, param) in params.iter().enumerate() {
                param_scope.insert(param.name, Some(i as u32));
            }
            self.scopes.push(param_scope);
            self.next_local = params.len() as u32;
            self.collect_locals(body);

            let locals: Vec<(u32, ValType)> =
                self.extra_locals.iter().map(|&vt| (1, vt)).collect();
            let mut func = Function::new(locals);
            self.compile_expr(body, &mut func)?;
            // the body's value is the return value; the checker already
            // matched it against the declared result
            func.instruction(&Instruction::End);
            code.function(&func);
        }

        // ── Pass 5: string data ──────────────────────────────────

        if !self.string_data.is_empty() {
            data.active(
                0,
                &ConstExpr::i32_const(STRING_BASE as i32),
                self.string_data.iter().copied(),
            );
        }

        // ── Assemble ─────────────────────────────────────────────

        let mut module = Module::new();
        module.section(&type_section);
        module.section(&imports);
        module.section(&functions);
        module.section(&memory);
        module.section(&exports);
        module.section(&code);
        module.section(&data);
        Ok(module.finish())
    }

    /// Walk a function body assigning a local slot to every definition
    /// with a representable value, in emission order. Nested function
    /// literals are not entered; emission rejects them.
    fn collect_locals(&mut self, id: ExprId) {
        match &self.module.exprs[id].kind {
            ast::ExprKind::Define { value, .. } => {
                self.collect_locals(*value);
                if let Some(vt) = valtype(&self.expr_ty(*value)) {
                    self.local_slots.insert(id, self.next_local);
                    self.next_local += 1;
                    self.extra_locals.push(vt);
                }
            }
            ast::ExprKind::Drop(value)
            | ast::ExprKind::Convert(value)
            | ast::ExprKind::PlusEqual { value, .. }
            | ast::ExprKind::TimesEqual { value, .. }
            | ast::ExprKind::ForeignExport { value, .. } => self.collect_locals(*value),
            ast::ExprKind::Binary { lhs, rhs, .. } => {
                self.collect_locals(*lhs);
                self.collect_locals(*rhs);
            }
            ast::ExprKind::Group(exprs) | ast::ExprKind::Block(exprs) => {
                for &e in exprs {
                    self.collect_locals(e);
                }
            }
            ast::ExprKind::Branch { arms, else_body } => {
                for arm in arms {
                    self.collect_locals(arm.condition);
                    self.collect_locals(arm.body);
                }
                self.collect_locals(*else_body);
            }
            ast::ExprKind::Call { callee, args } => {
                self.collect_locals(*callee);
                for &a in args {
                    self.collect_locals(a);
                }
            }
            ast::ExprKind::Intrinsic { args, .. } => {
                for &a in args {
                    self.collect_locals(a);
                }
            }
            ast::ExprKind::Int(_)
            | ast::ExprKind::Float(_)
            | ast::ExprKind::Bool(_)
            | ast::ExprKind::Str(_)
            | ast::ExprKind::Symbol(_)
            | ast::ExprKind::Function { .. }
            | ast::ExprKind::ForeignImport { .. }
            | ast::ExprKind::Undefined => {}
        }
    }
}

/// Every `foreign_import` node under `id`, in tree order.
fn collect_imports(module: &ast::Module, id: ExprId, out: &mut Vec<ExprId>) {
    match &module.exprs[id].kind {
        ast::ExprKind::ForeignImport { .. } => out.push(id),
        ast::ExprKind::Define { value, .. }
        | ast::ExprKind::Drop(value)
        | ast::ExprKind::Convert(value)
        | ast::ExprKind::PlusEqual { value, .. }
        | ast::ExprKind::TimesEqual { value, .. }
        | ast::ExprKind::ForeignExport { value, .. } => collect_imports(module, *value, out),
        ast::ExprKind::Function { body, .. } => collect_imports(module, *body, out),
        ast::ExprKind::Binary { lhs, rhs, .. } => {
            collect_imports(module, *lhs, out);
            collect_imports(module, *rhs, out);
        }
        ast::ExprKind::Group(exprs) | ast::ExprKind::Block(exprs) => {
            for &e in exprs {
                collect_imports(module, e, out);
            }
        }
        ast::ExprKind::Branch { arms, else_body } => {
            for arm in arms {
                collect_imports(module, arm.condition, out);
                collect_imports(module, arm.body, out);
            }
            collect_imports(module, *else_body, out);
        }
        ast::ExprKind::Call { callee, args } => {
            collect_imports(module, *callee, out);
            for &a in args {
                collect_imports(module, a, out);
            }
        }
        ast::ExprKind::Intrinsic { args, .. } => {
            for &a in args {
                collect_imports(module, a, out);
            }
        }
        ast::ExprKind::Int(_)
        | ast::ExprKind::Float(_)
        | ast::ExprKind::Bool(_)
        | ast::ExprKind::Str(_)
        | ast::ExprKind::Symbol(_)
        | ast::ExprKind::Undefined => {}
    }
}

// ── Tests ────────────────────────────────────────────────────────
