//! Function emission.
//!
//! Parameter and return types resolve through the type registry (unresolved
//! annotation strings become `any`, an absent return annotation means
//! `None`/void). Primitives pass unboxed; reference types pass as opaque
//! pointers, incref'd by the caller and released by the callee on every
//! exit path. A function whose final block lacks a terminator receives a
//! synthesised return of its declared type's default value.

use super::error::CodeGenError;
use super::scope::{ScopeStack, VarSlot};
use super::state::{CodeGen, CurrentFn, FnSig};
use super::types::{default_primitive, llvm_return_type, llvm_type};
use crate::ast::Function;
use crate::types::PyType;

/// Registry key and LLVM symbol for a function. Methods are namespaced by
/// their class and need a quoted symbol for the `.` separator.
fn function_key(func: &Function) -> String {
    match &func.class_context {
        Some(class) => format!("{}.{}", class, func.name),
        None => func.name.clone(),
    }
}

impl CodeGen {
    /// Record a function's signature so call sites (including earlier ones
    /// in the module) can resolve it. Idempotent; conflicting duplicate
    /// definitions are caught at emission.
    pub(super) fn register_function(&mut self, func: &Function) -> Result<(), CodeGenError> {
        let key = function_key(func);
        if self.functions.contains_key(&key) {
            return Ok(());
        }
        let params: Vec<PyType> = func
            .params
            .iter()
            .map(|p| {
                p.annotation
                    .as_deref()
                    .map(PyType::from_annotation)
                    .unwrap_or_else(PyType::any)
            })
            .collect();
        let return_type = func
            .return_annotation
            .as_deref()
            .map(PyType::from_annotation)
            .unwrap_or_else(PyType::none);
        let symbol = if key.contains('.') {
            format!("\"{}\"", key)
        } else {
            key.clone()
        };
        self.functions.insert(
            key,
            FnSig {
                symbol,
                params,
                return_type,
            },
        );
        Ok(())
    }

    /// Emit a complete function definition.
    pub(super) fn codegen_function(&mut self, func: &Function) -> Result<(), CodeGenError> {
        let key = function_key(func);
        let sig = self
            .functions
            .get(&key)
            .cloned()
            .expect("function registered before emission");
        if !self.emitted_functions.insert(key.clone()) {
            return Err(CodeGenError::logic(
                func.loc,
                format!("duplicate definition of function '{}'", key),
            ));
        }

        // Function emission nests (defs may appear at any statement
        // position), so the per-function state is saved and restored around
        // the body.
        let saved_alloca = std::mem::take(&mut self.alloca_buffer);
        let saved_body = std::mem::take(&mut self.body);
        let saved_fn = self.current_fn.take();
        let saved_loops = std::mem::take(&mut self.loop_stack);
        let saved_scopes = std::mem::replace(&mut self.scopes, ScopeStack::new());
        let saved_block = std::mem::replace(&mut self.current_block, "entry".to_string());
        let saved_terminated = self.block_terminated;
        self.block_terminated = false;

        let result = self.emit_function_inner(func, &sig);

        let allocas = std::mem::take(&mut self.alloca_buffer);
        let body = std::mem::take(&mut self.body);
        self.alloca_buffer = saved_alloca;
        self.body = saved_body;
        self.current_fn = saved_fn;
        self.loop_stack = saved_loops;
        self.scopes = saved_scopes;
        self.current_block = saved_block;
        self.block_terminated = saved_terminated;

        let param_decls = result?;
        self.functions_ir.push_str(&format!(
            "define {} @{}({}) {{\nentry:\n{}{}}}\n\n",
            llvm_return_type(&sig.return_type),
            sig.symbol,
            param_decls.join(", "),
            allocas,
            body
        ));
        Ok(())
    }

    fn emit_function_inner(
        &mut self,
        func: &Function,
        sig: &FnSig,
    ) -> Result<Vec<String>, CodeGenError> {
        self.current_fn = Some(CurrentFn {
            name: function_key(func),
            return_type: sig.return_type.clone(),
        });
        self.push_scope();

        let mut param_decls = Vec::with_capacity(func.params.len());
        for (i, (param, ty)) in func.params.iter().zip(sig.params.iter()).enumerate() {
            let arg = format!("%p{}", i);
            let boxed = ty.is_reference();
            let llvm = if boxed { "ptr" } else { llvm_type(ty) };
            param_decls.push(format!("{} {}", llvm, arg));

            let slot = self.fresh_slot(&param.name);
            self.emit_alloca(&slot, llvm)?;
            self.emit(&format!("store {} {}, ptr {}", llvm, arg, slot))?;
            if boxed {
                // Balances the caller's incref on every exit path.
                self.scopes.track_temp(&arg);
            }
            self.scopes.define(
                &param.name,
                VarSlot {
                    ptr: slot,
                    ty: ty.clone(),
                    boxed,
                },
            );
        }

        for stmt in &func.body {
            self.codegen_stmt(stmt)?;
        }

        if !self.block_terminated {
            self.emit_default_return(&sig.return_type)?;
        }
        self.pop_scope_silent();
        Ok(param_decls)
    }

    /// Synthesise a return of the declared type's default value.
    pub(super) fn emit_default_return(&mut self, ret_ty: &PyType) -> Result<(), CodeGenError> {
        if ret_ty.is_none() {
            let temps = self.scopes.all_temps();
            self.emit_decrefs(&temps)?;
            self.emit_terminator("ret void")
        } else if let Some(default) = default_primitive(ret_ty) {
            let temps = self.scopes.all_temps();
            self.emit_decrefs(&temps)?;
            self.emit_terminator(&format!("ret {} {}", llvm_type(ret_ty), default))
        } else {
            let none = self.call_runtime("py_get_none", "ptr", &[])?;
            self.call_runtime_void("py_incref", &[format!("ptr {}", none)])?;
            let temps = self.scopes.all_temps();
            self.emit_decrefs(&temps)?;
            self.emit_terminator(&format!("ret ptr {}", none))
        }
    }
}
