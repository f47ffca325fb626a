//! Statement code generation.
//!
//! Control-flow statements live in `control_flow.rs` and function emission
//! in `functions.rs`; everything else is here.

use super::error::CodeGenError;
use super::scope::VarSlot;
use super::state::{CodeGen, Value};
use super::types::llvm_type;
use crate::ast::{ClassDef, Expr, ExprKind, Loc, Stmt, StmtKind};
use crate::types::{PyType, TYPE_DICT, TYPE_LIST};

impl CodeGen {
    /// Emit one statement.
    pub(super) fn codegen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.codegen_expr(expr)?;
                Ok(())
            }
            StmtKind::Assign { name, value } => self.codegen_assign(name, value, stmt.loc),
            StmtKind::IndexAssign { target, value } => {
                self.codegen_index_assign(target, value, stmt.loc)
            }
            StmtKind::Return(value) => self.codegen_return(value.as_ref(), stmt.loc),
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => self.codegen_if(cond, then_block, else_block.as_deref()),
            StmtKind::While {
                cond,
                body,
                else_block,
            } => self.codegen_while(cond, body, else_block.as_deref()),
            StmtKind::For {
                var,
                iterable,
                body,
                else_block,
            } => self.codegen_for(var, iterable, body, else_block.as_deref(), stmt.loc),
            StmtKind::Break => self.codegen_break(stmt.loc),
            StmtKind::Continue => self.codegen_continue(stmt.loc),
            StmtKind::Print(value) => self.codegen_print(value),
            StmtKind::Pass => Ok(()),
            StmtKind::Import { module, alias } => self.codegen_import(module, alias.as_deref()),
            StmtKind::Class(class) => self.codegen_class(class),
            StmtKind::FunctionDef(func) => {
                self.register_function(func)?;
                self.codegen_function(func)
            }
        }
    }

    /// Emit a statement sequence inside a fresh scope frame. The frame's
    /// temporaries are drained on the fall-through path.
    pub(super) fn codegen_scoped_block(&mut self, block: &[Stmt]) -> Result<(), CodeGenError> {
        self.push_scope();
        for stmt in block {
            self.codegen_stmt(stmt)?;
        }
        if self.block_terminated {
            // Every path out already drained deeper frames.
            self.pop_scope_silent();
        } else {
            self.pop_scope()?;
        }
        Ok(())
    }

    // === Assignment ===

    fn codegen_assign(
        &mut self,
        name: &str,
        value: &Expr,
        loc: Loc,
    ) -> Result<(), CodeGenError> {
        let v = self.codegen_expr(value)?;

        if let Some(slot) = self.scopes.lookup(name).cloned() {
            if !v.ty.can_assign_to(&slot.ty) && !v.ty.is_any() {
                return Err(CodeGenError::type_error(
                    loc,
                    format!(
                        "Cannot assign '{}' to variable of type '{}'",
                        v.ty.name(),
                        slot.ty.name()
                    ),
                ));
            }
            if slot.boxed {
                let b = self.coerce_to_boxed(v, &slot.ty, loc)?;
                self.call_runtime_void("py_incref", &[format!("ptr {}", b.repr)])?;
                let old = self.fresh_temp();
                self.emit(&format!("{} = load ptr, ptr {}", old, slot.ptr))?;
                self.call_runtime_void("py_decref", &[format!("ptr {}", old)])?;
                self.emit(&format!("store ptr {}, ptr {}", b.repr, slot.ptr))?;
            } else {
                let u = self.coerce_to_unboxed(&v, &slot.ty, loc)?;
                self.emit(&format!(
                    "store {} {}, ptr {}",
                    llvm_type(&slot.ty),
                    u.repr,
                    slot.ptr
                ))?;
            }
            return Ok(());
        }

        // New variable: storage shape follows the value's type.
        if v.ty.is_reference() || v.boxed {
            let b = self.ensure_boxed(&v, loc)?;
            let ptr = self.fresh_slot(name);
            self.emit_alloca(&ptr, "ptr")?;
            self.call_runtime_void("py_incref", &[format!("ptr {}", b.repr)])?;
            self.emit(&format!("store ptr {}, ptr {}", b.repr, ptr))?;
            self.scopes.define(
                name,
                VarSlot {
                    ptr,
                    ty: b.ty,
                    boxed: true,
                },
            );
        } else {
            let ptr = self.fresh_slot(name);
            let llvm_ty = llvm_type(&v.ty);
            self.emit_alloca(&ptr, llvm_ty)?;
            self.emit(&format!("store {} {}, ptr {}", llvm_ty, v.repr, ptr))?;
            self.scopes.define(
                name,
                VarSlot {
                    ptr,
                    ty: v.ty,
                    boxed: false,
                },
            );
        }
        Ok(())
    }

    fn codegen_index_assign(
        &mut self,
        target: &Expr,
        value: &Expr,
        loc: Loc,
    ) -> Result<(), CodeGenError> {
        let ExprKind::Index {
            target: container,
            index,
        } = &target.kind
        else {
            return Err(CodeGenError::logic(
                loc,
                "index assignment target must be an index expression",
            ));
        };

        let c = self.codegen_expr(container)?;
        let i = self.codegen_expr(index)?;
        let v = self.codegen_expr(value)?;

        match c.ty.base_id() {
            TYPE_LIST => {
                let elem_ty = c.ty.element_type();
                if !v.ty.can_assign_to(&elem_ty) && !v.ty.is_any() {
                    return Err(CodeGenError::type_error(
                        loc,
                        format!(
                            "Cannot assign '{}' to element of '{}'",
                            v.ty.name(),
                            c.ty.name()
                        ),
                    ));
                }
                let idx = self.index_operand(&i, "list", loc)?;
                let b = self.coerce_to_boxed(v, &elem_ty, loc)?;
                self.call_runtime_void("py_incref", &[format!("ptr {}", b.repr)])?;
                self.call_runtime_void(
                    "py_list_set_item",
                    &[
                        format!("ptr {}", c.repr),
                        format!("i32 {}", idx),
                        format!("ptr {}", b.repr),
                    ],
                )?;
                Ok(())
            }
            TYPE_DICT => {
                let key_ty = c.ty.key_type();
                if !i.ty.can_assign_to(&key_ty) && !i.ty.is_any() {
                    return Err(CodeGenError::type_error(
                        loc,
                        format!(
                            "wrong index type for '{}': expected '{}', got '{}'",
                            c.ty.name(),
                            key_ty.name(),
                            i.ty.name()
                        ),
                    ));
                }
                let value_ty = c.ty.value_type();
                let kb = self.coerce_to_boxed(i, &key_ty, loc)?;
                let vb = self.coerce_to_boxed(v, &value_ty, loc)?;
                self.call_runtime_void("py_incref", &[format!("ptr {}", kb.repr)])?;
                self.call_runtime_void("py_incref", &[format!("ptr {}", vb.repr)])?;
                self.call_runtime_void(
                    "py_dict_set_item",
                    &[
                        format!("ptr {}", c.repr),
                        format!("ptr {}", kb.repr),
                        format!("ptr {}", vb.repr),
                    ],
                )?;
                Ok(())
            }
            id if id == crate::types::TYPE_ANY => self.codegen_any_index_assign(&c, &i, &v, loc),
            _ => Err(CodeGenError::type_error(
                loc,
                format!("type '{}' is not indexable", c.ty.name()),
            )),
        }
    }

    /// Index assignment into an `any`-typed target: runtime tag dispatch
    /// between list and dict (strings are immutable).
    fn codegen_any_index_assign(
        &mut self,
        obj: &Value,
        idx: &Value,
        value: &Value,
        loc: Loc,
    ) -> Result<(), CodeGenError> {
        let idx_i32 = if !idx.boxed && (idx.ty.is_int() || idx.ty.is_bool()) {
            Some(self.coerce_to_unboxed(idx, &PyType::int(), loc)?.repr)
        } else {
            None
        };
        let idx_boxed = self.ensure_boxed(idx, loc)?;
        let vb = self.ensure_boxed(value, loc)?;
        self.call_runtime_void("py_incref", &[format!("ptr {}", vb.repr)])?;

        let tid = self.call_runtime(
            "py_get_object_type_id",
            "i32",
            &[format!("ptr {}", obj.repr)],
        )?;

        let list_block = self.fresh_block("setindex.list");
        let check_dict = self.fresh_block("setindex.check_dict");
        let dict_block = self.fresh_block("setindex.dict");
        let fail_block = self.fresh_block("setindex.fail");
        let merge_block = self.fresh_block("setindex.merge");

        let is_list = self.emit_type_band_test(
            &tid,
            TYPE_LIST,
            crate::types::LIST_BASE,
            crate::types::DICT_BASE,
        )?;
        self.emit_terminator(&format!(
            "br i1 {}, label %{}, label %{}",
            is_list, list_block, check_dict
        ))?;

        self.emit_label(&check_dict)?;
        let is_dict = self.emit_type_band_test(
            &tid,
            TYPE_DICT,
            crate::types::DICT_BASE,
            crate::types::PTR_BASE,
        )?;
        self.emit_terminator(&format!(
            "br i1 {}, label %{}, label %{}",
            is_dict, dict_block, fail_block
        ))?;

        self.emit_label(&list_block)?;
        let list_idx = match &idx_i32 {
            Some(operand) => operand.clone(),
            None => {
                let converted = self.call_runtime(
                    "py_convert_any_to_int",
                    "ptr",
                    &[format!("ptr {}", idx_boxed.repr)],
                )?;
                let out =
                    self.call_runtime("py_extract_int", "i32", &[format!("ptr {}", converted)])?;
                self.call_runtime_void("py_decref", &[format!("ptr {}", converted)])?;
                out
            }
        };
        self.call_runtime_void(
            "py_list_set_item",
            &[
                format!("ptr {}", obj.repr),
                format!("i32 {}", list_idx),
                format!("ptr {}", vb.repr),
            ],
        )?;
        self.emit_terminator(&format!("br label %{}", merge_block))?;

        self.emit_label(&dict_block)?;
        self.call_runtime_void(
            "py_dict_set_item",
            &[
                format!("ptr {}", obj.repr),
                format!("ptr {}", idx_boxed.repr),
                format!("ptr {}", vb.repr),
            ],
        )?;
        self.emit_terminator(&format!("br label %{}", merge_block))?;

        self.emit_label(&fail_block)?;
        self.call_runtime_void(
            "py_raise_type_error",
            &[format!("i32 {}", TYPE_LIST), format!("i32 {}", tid)],
        )?;
        self.emit_terminator("unreachable")?;

        self.emit_label(&merge_block)?;
        Ok(())
    }

    // === Return ===

    pub(super) fn codegen_return(
        &mut self,
        value: Option<&Expr>,
        loc: Loc,
    ) -> Result<(), CodeGenError> {
        let Some(current) = self.current_fn.clone() else {
            return Err(CodeGenError::logic(loc, "'return' outside of a function"));
        };
        let ret_ty = current.return_type;

        if ret_ty.is_none() {
            if let Some(expr) = value {
                // The value is still evaluated for its effects.
                self.codegen_expr(expr)?;
            }
            let temps = self.scopes.all_temps();
            self.emit_decrefs(&temps)?;
            self.emit_terminator("ret void")?;
        } else if ret_ty.is_reference() {
            let operand = match value {
                Some(expr) => {
                    let v = self.codegen_expr(expr)?;
                    if !v.ty.can_assign_to(&ret_ty) && !v.ty.is_any() {
                        return Err(CodeGenError::type_error(
                            loc,
                            format!(
                                "Cannot return '{}' from a function returning '{}'",
                                v.ty.name(),
                                ret_ty.name()
                            ),
                        ));
                    }
                    let b = self.coerce_to_boxed(v, &ret_ty, loc)?;
                    b.repr
                }
                // A bare `return` in a reference-returning function yields
                // the canonical None.
                None => self.call_runtime("py_get_none", "ptr", &[])?,
            };
            // The caller inherits one reference.
            self.call_runtime_void("py_incref", &[format!("ptr {}", operand)])?;
            let temps = self.scopes.all_temps();
            self.emit_decrefs(&temps)?;
            self.emit_terminator(&format!("ret ptr {}", operand))?;
        } else {
            let operand = match value {
                Some(expr) => {
                    let v = self.codegen_expr(expr)?;
                    if !v.ty.can_assign_to(&ret_ty) && !v.ty.is_any() {
                        return Err(CodeGenError::type_error(
                            loc,
                            format!(
                                "Cannot return '{}' from a function returning '{}'",
                                v.ty.name(),
                                ret_ty.name()
                            ),
                        ));
                    }
                    self.coerce_to_unboxed(&v, &ret_ty, loc)?.repr
                }
                // A bare `return` with a primitive return type yields the
                // type's default value rather than failing compilation.
                None => super::types::default_primitive(&ret_ty)
                    .expect("primitive return type has a default")
                    .to_string(),
            };
            let temps = self.scopes.all_temps();
            self.emit_decrefs(&temps)?;
            self.emit_terminator(&format!("ret {} {}", llvm_type(&ret_ty), operand))?;
        }

        // Absorb any statements after the return into a dead block.
        let dead = self.fresh_block("dead");
        self.emit_label(&dead)?;
        Ok(())
    }

    // === Print ===

    fn codegen_print(&mut self, value: &Expr) -> Result<(), CodeGenError> {
        let v = self.codegen_expr(value)?;
        if !v.boxed {
            if v.ty.is_int() {
                return self.call_runtime_void("py_print_int", &[format!("i32 {}", v.repr)]);
            }
            if v.ty.is_double() {
                return self
                    .call_runtime_void("py_print_double", &[format!("double {}", v.repr)]);
            }
            if v.ty.is_bool() {
                return self.call_runtime_void("py_print_bool", &[format!("i1 {}", v.repr)]);
            }
        }
        if v.ty.is_string() {
            return self.call_runtime_void("py_print_string", &[format!("ptr {}", v.repr)]);
        }
        // Boxed or dynamic values print through the generic object path.
        let b = self.ensure_boxed(&v, value.loc)?;
        self.call_runtime_void("py_print_object", &[format!("ptr {}", b.repr)])
    }

    // === Import / class placeholders ===

    fn codegen_import(&mut self, module: &str, alias: Option<&str>) -> Result<(), CodeGenError> {
        let name_global = self.get_string_global(module)?;
        let ty = PyType::of(crate::types::TYPE_MODULE);
        let md = self.boxed_metadata(&ty);
        let out = self.call_runtime_with_metadata(
            "py_import_module",
            "ptr",
            &[format!("ptr {}", name_global)],
            &md,
        )?;
        self.scopes.track_temp(&out);

        let var_name = alias.unwrap_or(module);
        let ptr = self.fresh_slot(var_name);
        self.emit_alloca(&ptr, "ptr")?;
        self.call_runtime_void("py_incref", &[format!("ptr {}", out)])?;
        self.emit(&format!("store ptr {}, ptr {}", out, ptr))?;
        self.scopes.define(
            var_name,
            VarSlot {
                ptr,
                ty,
                boxed: true,
            },
        );
        Ok(())
    }

    fn codegen_class(&mut self, class: &ClassDef) -> Result<(), CodeGenError> {
        let name_global = self.get_string_global(&class.name)?;
        let ty = PyType::of(crate::types::TYPE_CLASS);
        let md = self.boxed_metadata(&ty);
        let cls = self.call_runtime_with_metadata(
            "py_create_class",
            "ptr",
            &[format!("ptr {}", name_global)],
            &md,
        )?;
        self.scopes.track_temp(&cls);

        for base in &class.bases {
            let Some(slot) = self.scopes.lookup(base).cloned() else {
                return Err(CodeGenError::logic(
                    class.loc,
                    format!("unknown base class '{}'", base),
                ));
            };
            let base_val = self.fresh_temp();
            self.emit(&format!("{} = load ptr, ptr {}", base_val, slot.ptr))?;
            self.call_runtime_void(
                "py_add_base_class",
                &[format!("ptr {}", cls), format!("ptr {}", base_val)],
            )?;
        }

        // Methods compile as free functions named Class.method and are
        // attached through the runtime stub.
        for method in &class.methods {
            self.register_function(method)?;
            self.codegen_function(method)?;
            let method_name_global = self.get_string_global(&method.name)?;
            let symbol = format!("{}.{}", class.name, method.name);
            self.call_runtime_void(
                "py_add_method",
                &[
                    format!("ptr {}", cls),
                    format!("ptr {}", method_name_global),
                    format!("ptr @\"{}\"", symbol),
                ],
            )?;
        }

        // The class body's other statements execute in their own scope.
        if !class.body.is_empty() {
            self.codegen_scoped_block(&class.body)?;
        }

        // Bind the class object to its name.
        let ptr = self.fresh_slot(&class.name);
        self.emit_alloca(&ptr, "ptr")?;
        self.call_runtime_void("py_incref", &[format!("ptr {}", cls)])?;
        self.emit(&format!("store ptr {}, ptr {}", cls, ptr))?;
        self.scopes.define(
            &class.name,
            VarSlot {
                ptr,
                ty,
                boxed: true,
            },
        );
        Ok(())
    }
}
