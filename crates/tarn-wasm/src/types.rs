use crate::WasmError;
use tarn_typeck::{CompileError, Ty};
use wasm_encoder::ValType;

/// The WASM value type carrying a solved type, or `None` for a valueless
/// one. Booleans are `i32` 0/1; strings are `i32` offsets into linear
/// memory.
pub(crate) fn valtype(ty: &Ty) -> Option<ValType> {
    match ty {
        Ty::Bool | Ty::I32 | Ty::Str => Some(ValType::I32),
        Ty::I64 => Some(ValType::I64),
        Ty::F32 => Some(ValType::F32),
        Ty::F64 => Some(ValType::F64),
        Ty::Void | Ty::Var(_) | Ty::Fn(..) | Ty::Module => None,
    }
}

/// Value type of a function parameter. Parameters must be representable.
pub(crate) fn param_valtype(ty: &Ty) -> Result<ValType, WasmError> {
    valtype(ty).ok_or_else(|| {
        WasmError::Compile(CompileError::UnsupportedReturnType { ty: ty.clone() })
    })
}

/// Value type of a function result. `void` has none, and so does a return
/// variable nothing ever constrained — a host function whose result no
/// caller uses.
pub(crate) fn result_valtype(ty: &Ty) -> Result<Option<ValType>, WasmError> {
    match ty {
        Ty::Void | Ty::Var(_) => Ok(None),
        Ty::Fn(..) | Ty::Module => Err(WasmError::Compile(
            CompileError::UnsupportedReturnType { ty: ty.clone() },
        )),
        _ => Ok(valtype(ty)),
    }
}
