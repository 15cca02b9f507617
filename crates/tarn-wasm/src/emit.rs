use crate::types::valtype;
use crate::{WasmCompiler, WasmError};
use smol_str::SmolStr;
use tarn_ast::{self as ast, BinOp, ExprId, ExprKind};
use tarn_lexer::{Name, Span};
use tarn_typeck::Ty;
use wasm_encoder::{BlockType, Function, Instruction};

impl WasmCompiler<'_> {
    /// Compile one expression, leaving its value (if it has one) on the
    /// stack.
    pub(crate) fn compile_expr(
        &mut self,
        id: ExprId,
        func: &mut Function,
    ) -> Result<(), WasmError> {
        let module = self.module;
        let expr = &module.exprs[id];
        match &expr.kind {
            ExprKind::Int(text) => match self.expr_ty(id) {
                Ty::I32 => {
                    let value = self.parse_num::<i32>(*text, expr.span)?;
                    func.instruction(&Instruction::I32Const(value));
                }
                Ty::I64 => {
                    let value = self.parse_num::<i64>(*text, expr.span)?;
                    func.instruction(&Instruction::I64Const(value));
                }
                other => {
                    return Err(WasmError::unsupported(
                        format!("integer literal of type {}", other),
                        expr.span,
                    ));
                }
            },

            ExprKind::Float(text) => match self.expr_ty(id) {
                Ty::F32 => {
                    let value = self.parse_num::<f32>(*text, expr.span)?;
                    func.instruction(&Instruction::F32Const(value));
                }
                Ty::F64 => {
                    let value = self.parse_num::<f64>(*text, expr.span)?;
                    func.instruction(&Instruction::F64Const(value));
                }
                other => {
                    return Err(WasmError::unsupported(
                        format!("float literal of type {}", other),
                        expr.span,
                    ));
                }
            },

            ExprKind::Bool(value) => {
                func.instruction(&Instruction::I32Const(i32::from(*value)));
            }

            ExprKind::Str(text) => {
                let raw = self.text(*text);
                let content = raw.strip_prefix('"').unwrap_or(raw);
                let content = content.strip_suffix('"').unwrap_or(content);
                let offset = self.intern_string(content);
                func.instruction(&Instruction::I32Const(offset as i32));
            }

            ExprKind::Symbol(name) => match self.resolve_local(*name) {
                Some(Some(slot)) => {
                    func.instruction(&Instruction::LocalGet(slot));
                }
                // a void-typed local holds no value
                Some(None) => {}
                None => {
                    return Err(WasmError::unsupported(
                        format!(
                            "`{}` cannot be used as a first-class value",
                            self.text(*name)
                        ),
                        expr.span,
                    ));
                }
            },

            ExprKind::Define { name, value, .. } => {
                self.compile_expr(*value, func)?;
                let slot = self.local_slots.get(&id).copied();
                if let Some(slot) = slot {
                    func.instruction(&Instruction::LocalSet(slot));
                }
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(*name, slot);
                }
            }

            ExprKind::Drop(value) => {
                self.compile_expr(*value, func)?;
                if valtype(&self.expr_ty(*value)).is_some() {
                    func.instruction(&Instruction::Drop);
                }
            }

            ExprKind::PlusEqual { name, value, .. }
            | ExprKind::TimesEqual { name, value, .. } => {
                let Some(Some(slot)) = self.resolve_local(*name) else {
                    return Err(WasmError::unsupported(
                        format!("`{}` is not an assignable local", self.text(*name)),
                        expr.span,
                    ));
                };
                let op = match expr.kind {
                    ExprKind::PlusEqual { .. } => BinOp::Add,
                    _ => BinOp::Mul,
                };
                func.instruction(&Instruction::LocalGet(slot));
                self.compile_expr(*value, func)?;
                let operand = self.expr_ty(*value);
                let instr = binary_instruction(op, &operand, expr.span)?;
                func.instruction(&instr);
                func.instruction(&Instruction::LocalSet(slot));
            }

            ExprKind::Block(stmts) => {
                self.scopes.push(Default::default());
                for &stmt in stmts {
                    self.compile_expr(stmt, func)?;
                }
                self.scopes.pop();
            }

            ExprKind::Group(exprs) => {
                for &e in exprs {
                    self.compile_expr(e, func)?;
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expr(*lhs, func)?;
                self.compile_expr(*rhs, func)?;
                let operand = self.expr_ty(*lhs);
                let instr = binary_instruction(*op, &operand, expr.span)?;
                func.instruction(&instr);
            }

            ExprKind::Branch { arms, else_body } => {
                let block_ty = match valtype(&self.expr_ty(id)) {
                    Some(vt) => BlockType::Result(vt),
                    None => BlockType::Empty,
                };
                self.compile_branch(arms, *else_body, block_ty, func)?;
            }

            ExprKind::Call { callee, args } => {
                for &arg in args {
                    self.compile_expr(arg, func)?;
                }
                self.compile_callee(*callee, expr.span, func)?;
            }

            // the wrapped convert operand carries the coercion
            ExprKind::Intrinsic { args, .. } => {
                for &arg in args {
                    self.compile_expr(arg, func)?;
                }
            }

            ExprKind::Convert(inner) => {
                let target = self.expr_ty(id);
                let src = self.expr_ty(*inner);
                self.compile_expr(*inner, func)?;
                if let Some(instr) = convert_instruction(&src, &target, expr.span)? {
                    func.instruction(&instr);
                }
            }

            ExprKind::ForeignImport { .. } => {
                return Err(WasmError::unsupported(
                    "host function used as a value",
                    expr.span,
                ));
            }

            ExprKind::ForeignExport { .. } => {
                return Err(WasmError::unsupported(
                    "export marker in expression position",
                    expr.span,
                ));
            }

            ExprKind::Function { .. } => {
                return Err(WasmError::unsupported(
                    "nested function literals are not supported",
                    expr.span,
                ));
            }

            ExprKind::Undefined => {
                func.instruction(&Instruction::Unreachable);
            }
        }
        Ok(())
    }

    /// Lower an `if`/`or`/`else` chain to nested `if` blocks.
    fn compile_branch(
        &mut self,
        arms: &[ast::Arm],
        else_body: ExprId,
        block_ty: BlockType,
        func: &mut Function,
    ) -> Result<(), WasmError> {
        match arms.split_first() {
            None => self.compile_expr(else_body, func),
            Some((arm, rest)) => {
                self.compile_expr(arm.condition, func)?;
                func.instruction(&Instruction::If(block_ty));
                self.compile_expr(arm.body, func)?;
                func.instruction(&Instruction::Else);
                self.compile_branch(rest, else_body, block_ty, func)?;
                func.instruction(&Instruction::End);
                Ok(())
            }
        }
    }

    fn compile_callee(
        &mut self,
        callee: ExprId,
        span: Span,
        func: &mut Function,
    ) -> Result<(), WasmError> {
        match self.module.exprs[callee].kind {
            ExprKind::Symbol(name) => {
                if self.resolve_local(name).is_some() {
                    return Err(WasmError::unsupported(
                        "indirect calls are not supported",
                        span,
                    ));
                }
                match self.func_indices.get(&name) {
                    Some(&idx) => {
                        func.instruction(&Instruction::Call(idx));
                        Ok(())
                    }
                    None => Err(WasmError::unsupported(
                        format!("call to unknown function `{}`", self.text(name)),
                        span,
                    )),
                }
            }
            ExprKind::ForeignImport { module, name } => {
                match self.import_indices.get(&(module, name)) {
                    Some(&idx) => {
                        func.instruction(&Instruction::Call(idx));
                        Ok(())
                    }
                    None => Err(WasmError::unsupported(
                        "call to an unregistered host function",
                        span,
                    )),
                }
            }
            _ => Err(WasmError::unsupported(
                "computed call targets are not supported",
                span,
            )),
        }
    }

    fn resolve_local(&self, name: Name) -> Option<Option<u32>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name).copied())
    }

    fn parse_num<T: std::str::FromStr>(&self, name: Name, span: Span) -> Result<T, WasmError> {
        let text = self.text(name);
        text.parse().map_err(|_| WasmError::MalformedLiteral {
            text: SmolStr::new(text),
            span,
        })
    }
}

/// Instruction for a binary operator at a concrete operand type.
/// Comparisons leave an `i32` boolean.
fn binary_instruction(
    op: BinOp,
    operand: &Ty,
    span: Span,
) -> Result<Instruction<'static>, WasmError> {
    use Instruction::*;
    let instr = match (op, operand) {
        (BinOp::Add, Ty::I32) => I32Add,
        (BinOp::Sub, Ty::I32) => I32Sub,
        (BinOp::Mul, Ty::I32) => I32Mul,
        (BinOp::Div, Ty::I32) => I32DivS,
        (BinOp::Rem, Ty::I32) => I32RemS,
        (BinOp::Xor, Ty::I32) => I32Xor,
        (BinOp::Eq, Ty::I32) => I32Eq,
        (BinOp::Gt, Ty::I32) => I32GtS,
        (BinOp::Lt, Ty::I32) => I32LtS,

        (BinOp::Add, Ty::I64) => I64Add,
        (BinOp::Sub, Ty::I64) => I64Sub,
        (BinOp::Mul, Ty::I64) => I64Mul,
        (BinOp::Div, Ty::I64) => I64DivS,
        (BinOp::Rem, Ty::I64) => I64RemS,
        (BinOp::Xor, Ty::I64) => I64Xor,
        (BinOp::Eq, Ty::I64) => I64Eq,
        (BinOp::Gt, Ty::I64) => I64GtS,
        (BinOp::Lt, Ty::I64) => I64LtS,

        (BinOp::Add, Ty::F32) => F32Add,
        (BinOp::Sub, Ty::F32) => F32Sub,
        (BinOp::Mul, Ty::F32) => F32Mul,
        (BinOp::Div, Ty::F32) => F32Div,
        (BinOp::Eq, Ty::F32) => F32Eq,
        (BinOp::Gt, Ty::F32) => F32Gt,
        (BinOp::Lt, Ty::F32) => F32Lt,

        (BinOp::Add, Ty::F64) => F64Add,
        (BinOp::Sub, Ty::F64) => F64Sub,
        (BinOp::Mul, Ty::F64) => F64Mul,
        (BinOp::Div, Ty::F64) => F64Div,
        (BinOp::Eq, Ty::F64) => F64Eq,
        (BinOp::Gt, Ty::F64) => F64Gt,
        (BinOp::Lt, Ty::F64) => F64Lt,

        (BinOp::Eq, Ty::Bool) => I32Eq,

        _ => {
            return Err(WasmError::unsupported(
                format!("operator `{}` on {}", op.symbol(), operand),
                span,
            ));
        }
    };
    Ok(instr)
}

/// Numeric conversion instruction, or `None` when source and target
/// already agree.
fn convert_instruction(
    src: &Ty,
    target: &Ty,
    span: Span,
) -> Result<Option<Instruction<'static>>, WasmError> {
    use Instruction::*;
    if src == target {
        return Ok(None);
    }
    let instr = match (src, target) {
        (Ty::I32, Ty::I64) => I64ExtendI32S,
        (Ty::I64, Ty::I32) => I32WrapI64,
        (Ty::I32, Ty::F32) => F32ConvertI32S,
        (Ty::I32, Ty::F64) => F64ConvertI32S,
        (Ty::I64, Ty::F32) => F32ConvertI64S,
        (Ty::I64, Ty::F64) => F64ConvertI64S,
        (Ty::F32, Ty::I32) => I32TruncF32S,
        (Ty::F64, Ty::I32) => I32TruncF64S,
        (Ty::F32, Ty::I64) => I64TruncF32S,
        (Ty::F64, Ty::I64) => I64TruncF64S,
        (Ty::F32, Ty::F64) => F64PromoteF32,
        (Ty::F64, Ty::F32) => F32DemoteF64,
        _ => {
            return Err(WasmError::unsupported(
                format!("no conversion from {} to {}", src, target),
                span,
            ));
        }
    };
    Ok(Some(instr))
}
