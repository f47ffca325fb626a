//! Expression code generation.
//!
//! Each visitor returns a [`Value`]: the operand text, the Python type, and
//! whether the value is boxed. Primitive-only operations lower to native
//! LLVM instructions; mixed or reference operands are boxed and dispatched
//! to the runtime helper named by the type-operation registry.

use super::error::CodeGenError;
use super::state::{CodeGen, Value};
use super::types::llvm_type;
use crate::ast::{BinaryOp, Expr, ExprKind, Loc, UnaryOp};
use crate::typeops::{self, InlineBinary, InlineUnary};
use crate::types::{PyType, DICT_BASE, LIST_BASE, PTR_BASE, TYPE_DICT, TYPE_LIST, TYPE_STRING};

impl CodeGen {
    pub(super) fn codegen_expr(&mut self, expr: &Expr) -> Result<Value, CodeGenError> {
        match &expr.kind {
            ExprKind::Number { text, is_float } => self.codegen_number(text, *is_float, expr.loc),
            ExprKind::Str(value) => self.codegen_string_literal(value),
            ExprKind::Bool(value) => Ok(Value::unboxed(
                if *value { "1" } else { "0" },
                PyType::bool(),
            )),
            ExprKind::NoneLit => self.codegen_none(),
            ExprKind::Variable(name) => self.codegen_variable(name, expr.loc),
            ExprKind::Unary { op, operand } => self.codegen_unary(*op, operand, expr.loc),
            ExprKind::Binary { op, lhs, rhs } => self.codegen_binary(*op, lhs, rhs, expr.loc),
            ExprKind::Call { callee, args } => self.codegen_call(callee, args, expr.loc),
            ExprKind::Index { target, index } => self.codegen_index_read(target, index, expr.loc),
            ExprKind::List(elements) => self.codegen_list_literal(elements, expr.loc),
            ExprKind::Dict(pairs) => self.codegen_dict_literal(pairs, expr.loc),
        }
    }

    // === Literals ===

    fn codegen_number(
        &mut self,
        text: &str,
        is_float: bool,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        if is_float {
            let operand = self.double_literal_operand(text, loc)?;
            Ok(Value::unboxed(operand, PyType::double()))
        } else {
            let operand = self.int_literal_operand(text, loc)?;
            Ok(Value::unboxed(operand, PyType::int()))
        }
    }

    fn codegen_string_literal(&mut self, value: &str) -> Result<Value, CodeGenError> {
        let global = self.get_string_global(value)?;
        let ty = PyType::string();
        let md = self.boxed_metadata(&ty);
        let out = self.call_runtime_with_metadata(
            "py_create_string",
            "ptr",
            &[format!("ptr {}", global)],
            &md,
        )?;
        self.scopes.track_temp(&out);
        Ok(Value::boxed(out, ty))
    }

    fn codegen_none(&mut self) -> Result<Value, CodeGenError> {
        // The canonical None is immortal; it is never tracked for decref.
        let out = self.call_runtime("py_get_none", "ptr", &[])?;
        Ok(Value::boxed(out, PyType::none()))
    }

    fn codegen_variable(&mut self, name: &str, loc: Loc) -> Result<Value, CodeGenError> {
        let Some(slot) = self.scopes.lookup(name).cloned() else {
            return Err(CodeGenError::logic(
                loc,
                format!("undefined variable '{}'", name),
            ));
        };
        let llvm_ty = if slot.boxed { "ptr" } else { llvm_type(&slot.ty) };
        let out = self.fresh_temp();
        self.emit(&format!("{} = load {}, ptr {}", out, llvm_ty, slot.ptr))?;
        Ok(Value {
            repr: out,
            ty: slot.ty,
            boxed: slot.boxed,
        })
    }

    // === Operators ===

    fn codegen_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        let v = self.codegen_expr(operand)?;

        if op == UnaryOp::Not {
            let cond = self.condition_operand(&v)?;
            let out = self.fresh_temp();
            self.emit(&format!("{} = xor i1 {}, true", out, cond))?;
            return Ok(Value::unboxed(out, PyType::bool()));
        }

        // bool participates in arithmetic as int
        let operand_ty = if v.ty.is_bool() {
            PyType::int()
        } else {
            v.ty.clone()
        };
        let Some(desc) = typeops::unary_desc(op, operand_ty.id()) else {
            return Err(CodeGenError::type_error(
                loc,
                format!(
                    "unsupported operand type for unary '{}': '{}'",
                    op.symbol(),
                    v.ty.name()
                ),
            ));
        };
        let u = self.coerce_to_unboxed(&v, &operand_ty, loc)?;
        match desc.inline {
            InlineUnary::IntNeg => {
                let out = self.fresh_temp();
                self.emit(&format!("{} = sub i32 0, {}", out, u.repr))?;
                Ok(Value::unboxed(out, PyType::int()))
            }
            InlineUnary::FloatNeg => {
                let out = self.fresh_temp();
                self.emit(&format!("{} = fneg double {}", out, u.repr))?;
                Ok(Value::unboxed(out, PyType::double()))
            }
            InlineUnary::Identity => Ok(u),
            InlineUnary::LogicalNot => unreachable!("handled above"),
        }
    }

    fn codegen_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                return self.codegen_short_circuit(op, lhs, rhs);
            }
            BinaryOp::Is | BinaryOp::IsNot => {
                return self.codegen_identity(op, lhs, rhs, loc);
            }
            _ => {}
        }

        let l = self.codegen_expr(lhs)?;
        let r = self.codegen_expr(rhs)?;

        let Some((tl, tr)) = typeops::find_operable_path(op, l.ty.id(), r.ty.id()) else {
            return Err(CodeGenError::type_error(
                loc,
                format!(
                    "unsupported operand types for '{}': '{}' and '{}'",
                    op.symbol(),
                    l.ty.name(),
                    r.ty.name()
                ),
            ));
        };
        let desc = typeops::binary_desc(op, tl, tr)
            .expect("find_operable_path guarantees a descriptor");

        if let Some(inline) = desc.inline {
            let lv = self.coerce_to_unboxed(&l, &PyType::of(tl), loc)?;
            let rv = self.coerce_to_unboxed(&r, &PyType::of(tr), loc)?;
            return self.emit_inline_binary(op, inline, &lv, &rv, desc.result_type_id);
        }

        let helper = desc
            .runtime_fn
            .expect("non-inline descriptor names a runtime helper");
        let lb = self.coerce_to_boxed(l, &PyType::of(tl), loc)?;
        let rb = self.coerce_to_boxed(r, &PyType::of(tr), loc)?;
        let result_ty = PyType::of(desc.result_type_id);
        let md = self.boxed_metadata(&result_ty);

        let out = if helper == "py_object_compare" {
            let code = typeops::comparison_code(op).expect("comparison operator");
            self.call_runtime_with_metadata(
                "py_object_compare",
                "ptr",
                &[
                    format!("ptr {}", lb.repr),
                    format!("ptr {}", rb.repr),
                    format!("i32 {}", code),
                ],
                &md,
            )?
        } else {
            self.call_runtime_with_metadata(
                helper,
                "ptr",
                &[format!("ptr {}", lb.repr), format!("ptr {}", rb.repr)],
                &md,
            )?
        };
        self.scopes.track_temp(&out);
        Ok(Value::boxed(out, result_ty))
    }

    fn emit_inline_binary(
        &mut self,
        op: BinaryOp,
        inline: InlineBinary,
        lhs: &Value,
        rhs: &Value,
        result_type_id: u32,
    ) -> Result<Value, CodeGenError> {
        let result_ty = PyType::of(result_type_id);
        let out = match inline {
            InlineBinary::IntArith => {
                let instr = match op {
                    BinaryOp::Add => "add",
                    BinaryOp::Sub => "sub",
                    BinaryOp::Mul => "mul",
                    BinaryOp::Mod => "srem",
                    _ => unreachable!("not an int-arith operator"),
                };
                let out = self.fresh_temp();
                self.emit(&format!(
                    "{} = {} i32 {}, {}",
                    out, instr, lhs.repr, rhs.repr
                ))?;
                out
            }
            InlineBinary::FloatArith => {
                let instr = match op {
                    BinaryOp::Add => "fadd",
                    BinaryOp::Sub => "fsub",
                    BinaryOp::Mul => "fmul",
                    BinaryOp::Div => "fdiv",
                    BinaryOp::Mod => "frem",
                    _ => unreachable!("not a float-arith operator"),
                };
                let out = self.fresh_temp();
                self.emit(&format!(
                    "{} = {} double {}, {}",
                    out, instr, lhs.repr, rhs.repr
                ))?;
                out
            }
            InlineBinary::IntFloorDiv => {
                let out = self.fresh_temp();
                self.emit(&format!("{} = sdiv i32 {}, {}", out, lhs.repr, rhs.repr))?;
                out
            }
            InlineBinary::FloatFloorDiv => {
                let quotient = self.fresh_temp();
                self.emit(&format!(
                    "{} = fdiv double {}, {}",
                    quotient, lhs.repr, rhs.repr
                ))?;
                self.call_runtime(
                    "llvm.floor.f64",
                    "double",
                    &[format!("double {}", quotient)],
                )?
            }
            InlineBinary::IntPow => {
                let lf = self.fresh_temp();
                self.emit(&format!("{} = sitofp i32 {} to double", lf, lhs.repr))?;
                let rf = self.fresh_temp();
                self.emit(&format!("{} = sitofp i32 {} to double", rf, rhs.repr))?;
                let p = self.call_runtime(
                    "llvm.pow.f64",
                    "double",
                    &[format!("double {}", lf), format!("double {}", rf)],
                )?;
                let out = self.fresh_temp();
                self.emit(&format!("{} = fptosi double {} to i32", out, p))?;
                out
            }
            InlineBinary::FloatPow => self.call_runtime(
                "llvm.pow.f64",
                "double",
                &[
                    format!("double {}", lhs.repr),
                    format!("double {}", rhs.repr),
                ],
            )?,
            InlineBinary::IntCompare => {
                let pred = match op {
                    BinaryOp::Eq => "eq",
                    BinaryOp::NotEq => "ne",
                    BinaryOp::Lt => "slt",
                    BinaryOp::Le => "sle",
                    BinaryOp::Gt => "sgt",
                    BinaryOp::Ge => "sge",
                    _ => unreachable!("not a comparison operator"),
                };
                let llvm_ty = if lhs.ty.is_bool() { "i1" } else { "i32" };
                let out = self.fresh_temp();
                self.emit(&format!(
                    "{} = icmp {} {} {}, {}",
                    out, pred, llvm_ty, lhs.repr, rhs.repr
                ))?;
                out
            }
            InlineBinary::FloatCompare => {
                let pred = match op {
                    BinaryOp::Eq => "oeq",
                    BinaryOp::NotEq => "one",
                    BinaryOp::Lt => "olt",
                    BinaryOp::Le => "ole",
                    BinaryOp::Gt => "ogt",
                    BinaryOp::Ge => "oge",
                    _ => unreachable!("not a comparison operator"),
                };
                let out = self.fresh_temp();
                self.emit(&format!(
                    "{} = fcmp {} double {}, {}",
                    out, pred, lhs.repr, rhs.repr
                ))?;
                out
            }
        };
        Ok(Value::unboxed(out, result_ty))
    }

    /// `is` / `is not`: value equality for same-type primitives, pointer
    /// identity for boxed values.
    fn codegen_identity(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        let l = self.codegen_expr(lhs)?;
        let r = self.codegen_expr(rhs)?;
        let negate = op == BinaryOp::IsNot;
        let out = self.fresh_temp();

        if !l.boxed && !r.boxed && l.ty.equals(&r.ty) {
            if l.ty.is_double() {
                let pred = if negate { "one" } else { "oeq" };
                self.emit(&format!(
                    "{} = fcmp {} double {}, {}",
                    out, pred, l.repr, r.repr
                ))?;
            } else {
                let pred = if negate { "ne" } else { "eq" };
                let llvm_ty = llvm_type(&l.ty);
                self.emit(&format!(
                    "{} = icmp {} {} {}, {}",
                    out, pred, llvm_ty, l.repr, r.repr
                ))?;
            }
        } else {
            let lb = self.ensure_boxed(&l, loc)?;
            let rb = self.ensure_boxed(&r, loc)?;
            let pred = if negate { "ne" } else { "eq" };
            self.emit(&format!(
                "{} = icmp {} ptr {}, {}",
                out, pred, lb.repr, rb.repr
            ))?;
        }
        Ok(Value::unboxed(out, PyType::bool()))
    }

    /// `and` / `or` lower as short-circuiting control flow merged by a phi.
    fn codegen_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value, CodeGenError> {
        let prefix = if op == BinaryOp::And { "and" } else { "or" };
        let rhs_block = self.fresh_block(&format!("{}.rhs", prefix));
        let end_block = self.fresh_block(&format!("{}.end", prefix));

        let lcond = self.codegen_condition(lhs)?;
        let lhs_end = self.current_block.clone();
        if op == BinaryOp::And {
            self.emit_terminator(&format!(
                "br i1 {}, label %{}, label %{}",
                lcond, rhs_block, end_block
            ))?;
        } else {
            self.emit_terminator(&format!(
                "br i1 {}, label %{}, label %{}",
                lcond, end_block, rhs_block
            ))?;
        }

        // The right-hand side runs on one path only, so its temporaries are
        // scoped to the arm.
        self.emit_label(&rhs_block)?;
        self.push_scope();
        let rcond = self.codegen_condition(rhs)?;
        self.pop_scope()?;
        let rhs_end = self.current_block.clone();
        self.emit_terminator(&format!("br label %{}", end_block))?;

        self.emit_label(&end_block)?;
        let short_value = if op == BinaryOp::And { "false" } else { "true" };
        let out = self.fresh_temp();
        self.emit(&format!(
            "{} = phi i1 [ {}, %{} ], [ {}, %{} ]",
            out, short_value, lhs_end, rcond, rhs_end
        ))?;
        Ok(Value::unboxed(out, PyType::bool()))
    }

    // === Index ===

    fn codegen_index_read(
        &mut self,
        target: &Expr,
        index: &Expr,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        let t = self.codegen_expr(target)?;
        let i = self.codegen_expr(index)?;

        match t.ty.base_id() {
            TYPE_LIST => {
                let idx = self.index_operand(&i, "list", loc)?;
                let elem_ty = t.ty.element_type();
                let md = self.boxed_metadata(&elem_ty);
                let out = self.call_runtime_with_metadata(
                    "py_list_get_item",
                    "ptr",
                    &[format!("ptr {}", t.repr), format!("i32 {}", idx)],
                    &md,
                )?;
                self.scopes.track_temp(&out);
                Ok(Value::boxed(out, elem_ty))
            }
            TYPE_STRING => {
                let idx = self.index_operand(&i, "string", loc)?;
                let ty = PyType::string();
                let md = self.boxed_metadata(&ty);
                let out = self.call_runtime_with_metadata(
                    "py_string_get_char",
                    "ptr",
                    &[format!("ptr {}", t.repr), format!("i32 {}", idx)],
                    &md,
                )?;
                self.scopes.track_temp(&out);
                Ok(Value::boxed(out, ty))
            }
            TYPE_DICT => {
                let key_ty = t.ty.key_type();
                if !i.ty.can_assign_to(&key_ty) && !i.ty.is_any() {
                    return Err(CodeGenError::type_error(
                        loc,
                        format!(
                            "wrong index type for '{}': expected '{}', got '{}'",
                            t.ty.name(),
                            key_ty.name(),
                            i.ty.name()
                        ),
                    ));
                }
                let kb = self.coerce_to_boxed(i, &key_ty, loc)?;
                let value_ty = t.ty.value_type();
                let md = self.boxed_metadata(&value_ty);
                let out = self.call_runtime_with_metadata(
                    "py_dict_get_item",
                    "ptr",
                    &[format!("ptr {}", t.repr), format!("ptr {}", kb.repr)],
                    &md,
                )?;
                self.scopes.track_temp(&out);
                Ok(Value::boxed(out, value_ty))
            }
            id if id == crate::types::TYPE_ANY => self.codegen_any_index_read(&t, &i, loc),
            _ => Err(CodeGenError::type_error(
                loc,
                format!("type '{}' is not indexable", t.ty.name()),
            )),
        }
    }

    /// Index into an `any`-typed target: read the runtime type tag and
    /// dispatch to the list/string/dict helper, merging with a phi.
    fn codegen_any_index_read(
        &mut self,
        obj: &Value,
        idx: &Value,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        // Forms that must dominate the merge are computed up front.
        let idx_i32 = if !idx.boxed && (idx.ty.is_int() || idx.ty.is_bool()) {
            Some(self.coerce_to_unboxed(idx, &PyType::int(), loc)?.repr)
        } else {
            None
        };
        let idx_boxed = self.ensure_boxed(idx, loc)?;

        let tid = self.call_runtime(
            "py_get_object_type_id",
            "i32",
            &[format!("ptr {}", obj.repr)],
        )?;

        let list_block = self.fresh_block("index.list");
        let check_dict = self.fresh_block("index.check_dict");
        let dict_block = self.fresh_block("index.dict");
        let check_str = self.fresh_block("index.check_str");
        let str_block = self.fresh_block("index.str");
        let fail_block = self.fresh_block("index.fail");
        let merge_block = self.fresh_block("index.merge");

        let is_list = self.emit_type_band_test(&tid, TYPE_LIST, LIST_BASE, DICT_BASE)?;
        self.emit_terminator(&format!(
            "br i1 {}, label %{}, label %{}",
            is_list, list_block, check_dict
        ))?;

        self.emit_label(&check_dict)?;
        let is_dict = self.emit_type_band_test(&tid, TYPE_DICT, DICT_BASE, PTR_BASE)?;
        self.emit_terminator(&format!(
            "br i1 {}, label %{}, label %{}",
            is_dict, dict_block, check_str
        ))?;

        self.emit_label(&check_str)?;
        let is_str = self.fresh_temp();
        self.emit(&format!("{} = icmp eq i32 {}, {}", is_str, tid, TYPE_STRING))?;
        self.emit_terminator(&format!(
            "br i1 {}, label %{}, label %{}",
            is_str, str_block, fail_block
        ))?;

        // list branch
        self.emit_label(&list_block)?;
        let list_idx = match &idx_i32 {
            Some(operand) => operand.clone(),
            None => self.unbox_index_immediate(&idx_boxed)?,
        };
        let list_result = self.call_runtime(
            "py_list_get_item",
            "ptr",
            &[format!("ptr {}", obj.repr), format!("i32 {}", list_idx)],
        )?;
        let list_end = self.current_block.clone();
        self.emit_terminator(&format!("br label %{}", merge_block))?;

        // dict branch
        self.emit_label(&dict_block)?;
        let dict_result = self.call_runtime(
            "py_dict_get_item",
            "ptr",
            &[format!("ptr {}", obj.repr), format!("ptr {}", idx_boxed.repr)],
        )?;
        let dict_end = self.current_block.clone();
        self.emit_terminator(&format!("br label %{}", merge_block))?;

        // string branch
        self.emit_label(&str_block)?;
        let str_idx = match &idx_i32 {
            Some(operand) => operand.clone(),
            None => self.unbox_index_immediate(&idx_boxed)?,
        };
        let str_result = self.call_runtime(
            "py_string_get_char",
            "ptr",
            &[format!("ptr {}", obj.repr), format!("i32 {}", str_idx)],
        )?;
        let str_end = self.current_block.clone();
        self.emit_terminator(&format!("br label %{}", merge_block))?;

        // failure branch: the runtime raises and never returns
        self.emit_label(&fail_block)?;
        self.call_runtime_void(
            "py_raise_type_error",
            &[format!("i32 {}", TYPE_LIST), format!("i32 {}", tid)],
        )?;
        self.emit_terminator("unreachable")?;

        self.emit_label(&merge_block)?;
        let out = self.fresh_temp();
        self.emit(&format!(
            "{} = phi ptr [ {}, %{} ], [ {}, %{} ], [ {}, %{} ]",
            out, list_result, list_end, dict_result, dict_end, str_result, str_end
        ))?;
        self.scopes.track_temp(&out);
        Ok(Value::boxed(out, PyType::any()))
    }

    /// `tid == exact || (lo <= tid < hi)` for runtime type-band tests.
    pub(super) fn emit_type_band_test(
        &mut self,
        tid: &str,
        exact: u32,
        lo: u32,
        hi: u32,
    ) -> Result<String, CodeGenError> {
        let eq = self.fresh_temp();
        self.emit(&format!("{} = icmp eq i32 {}, {}", eq, tid, exact))?;
        let ge = self.fresh_temp();
        self.emit(&format!("{} = icmp sge i32 {}, {}", ge, tid, lo))?;
        let lt = self.fresh_temp();
        self.emit(&format!("{} = icmp slt i32 {}, {}", lt, tid, hi))?;
        let band = self.fresh_temp();
        self.emit(&format!("{} = and i1 {}, {}", band, ge, lt))?;
        let out = self.fresh_temp();
        self.emit(&format!("{} = or i1 {}, {}", out, eq, band))?;
        Ok(out)
    }

    /// Convert a boxed value into an `i32` index inside a branch, releasing
    /// the intermediate box immediately so nothing escapes the arm.
    fn unbox_index_immediate(&mut self, boxed: &Value) -> Result<String, CodeGenError> {
        let converted = self.call_runtime(
            "py_convert_any_to_int",
            "ptr",
            &[format!("ptr {}", boxed.repr)],
        )?;
        let out = self.call_runtime("py_extract_int", "i32", &[format!("ptr {}", converted)])?;
        self.call_runtime_void("py_decref", &[format!("ptr {}", converted)])?;
        Ok(out)
    }

    /// Coerce a value into an unboxed `i32` index operand, with a dedicated
    /// diagnostic naming the indexed container.
    pub(super) fn index_operand(
        &mut self,
        idx: &Value,
        what: &str,
        loc: Loc,
    ) -> Result<String, CodeGenError> {
        if !(idx.ty.is_int() || idx.ty.is_bool() || idx.ty.is_any()) {
            return Err(CodeGenError::type_error(
                loc,
                format!("{} indices must be integers, not '{}'", what, idx.ty.name()),
            ));
        }
        Ok(self.coerce_to_unboxed(idx, &PyType::int(), loc)?.repr)
    }

    // === Calls ===

    fn codegen_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        let ExprKind::Variable(name) = &callee.kind else {
            return Err(CodeGenError::logic(
                loc,
                "only named functions can be called",
            ));
        };

        if name == "len" && args.len() == 1 && !self.functions.contains_key("len") {
            return self.codegen_len(&args[0], loc);
        }

        let Some(sig) = self.functions.get(name.as_str()).cloned() else {
            return Err(CodeGenError::logic(
                loc,
                format!("unknown function '{}'", name),
            ));
        };
        if args.len() != sig.params.len() {
            return Err(CodeGenError::type_error(
                loc,
                format!(
                    "function '{}' expects {} argument(s), got {}",
                    name,
                    sig.params.len(),
                    args.len()
                ),
            ));
        }

        let mut operands = Vec::with_capacity(args.len());
        for (arg, param_ty) in args.iter().zip(sig.params.iter()) {
            let v = self.codegen_expr(arg)?;
            if !v.ty.can_assign_to(param_ty) && !v.ty.is_any() {
                return Err(CodeGenError::type_error(
                    arg.loc,
                    format!(
                        "cannot pass '{}' for parameter of type '{}'",
                        v.ty.name(),
                        param_ty.name()
                    ),
                ));
            }
            if param_ty.is_reference() {
                // Reference parameters are boxed and incref'd at the call
                // site; the callee releases them on exit.
                let b = self.coerce_to_boxed(v, param_ty, loc)?;
                self.call_runtime_void("py_incref", &[format!("ptr {}", b.repr)])?;
                operands.push(format!("ptr {}", b.repr));
            } else {
                let u = self.coerce_to_unboxed(&v, param_ty, loc)?;
                operands.push(format!("{} {}", llvm_type(param_ty), u.repr));
            }
        }

        let ret_ty = sig.return_type.clone();
        if ret_ty.is_none() {
            self.emit(&format!(
                "call void @{}({})",
                sig.symbol,
                operands.join(", ")
            ))?;
            return self.codegen_none();
        }

        if ret_ty.is_reference() {
            let md = self.boxed_metadata(&ret_ty);
            let out = self.fresh_temp();
            self.emit(&format!(
                "{} = call ptr @{}({}){}",
                out,
                sig.symbol,
                operands.join(", "),
                md
            ))?;
            self.scopes.track_temp(&out);
            Ok(Value::boxed(out, ret_ty))
        } else {
            let out = self.fresh_temp();
            self.emit(&format!(
                "{} = call {} @{}({})",
                out,
                llvm_type(&ret_ty),
                sig.symbol,
                operands.join(", ")
            ))?;
            Ok(Value::unboxed(out, ret_ty))
        }
    }

    fn codegen_len(&mut self, arg: &Expr, loc: Loc) -> Result<Value, CodeGenError> {
        let v = self.codegen_expr(arg)?;
        let helper = match v.ty.base_id() {
            TYPE_LIST => "py_list_len",
            TYPE_DICT => "py_dict_len",
            _ => {
                return Err(CodeGenError::type_error(
                    loc,
                    format!("len() is not supported for '{}'", v.ty.name()),
                ));
            }
        };
        let out = self.call_runtime(helper, "i32", &[format!("ptr {}", v.repr)])?;
        Ok(Value::unboxed(out, PyType::int()))
    }

    // === Collections ===

    fn codegen_list_literal(
        &mut self,
        elements: &[Expr],
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        let values: Vec<Value> = elements
            .iter()
            .map(|e| self.codegen_expr(e))
            .collect::<Result<_, _>>()?;

        let elem_ty = common_type(&values);
        let list_ty = PyType::list_of(&elem_ty);
        let md = self.boxed_metadata(&list_ty);
        let list = self.call_runtime_with_metadata(
            "py_create_list",
            "ptr",
            &[
                format!("i32 {}", values.len()),
                format!("i32 {}", elem_ty.id()),
            ],
            &md,
        )?;
        self.scopes.track_temp(&list);

        for (i, v) in values.into_iter().enumerate() {
            let b = self.coerce_to_boxed(v, &elem_ty, loc)?;
            self.call_runtime_void("py_incref", &[format!("ptr {}", b.repr)])?;
            self.call_runtime_void(
                "py_list_set_item",
                &[
                    format!("ptr {}", list),
                    format!("i32 {}", i),
                    format!("ptr {}", b.repr),
                ],
            )?;
        }
        Ok(Value::boxed(list, list_ty))
    }

    fn codegen_dict_literal(
        &mut self,
        pairs: &[(Expr, Expr)],
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        let mut keys = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            keys.push(self.codegen_expr(k)?);
            values.push(self.codegen_expr(v)?);
        }

        let key_ty = common_type(&keys);
        let value_ty = common_type(&values);
        let dict_ty = PyType::dict_of(&key_ty, &value_ty);
        let md = self.boxed_metadata(&dict_ty);
        let dict = self.call_runtime_with_metadata(
            "py_create_dict",
            "ptr",
            &[
                format!("i32 {}", pairs.len()),
                format!("i32 {}", key_ty.id()),
            ],
            &md,
        )?;
        self.scopes.track_temp(&dict);

        for (k, v) in keys.into_iter().zip(values.into_iter()) {
            let kb = self.coerce_to_boxed(k, &key_ty, loc)?;
            let vb = self.coerce_to_boxed(v, &value_ty, loc)?;
            self.call_runtime_void("py_incref", &[format!("ptr {}", kb.repr)])?;
            self.call_runtime_void("py_incref", &[format!("ptr {}", vb.repr)])?;
            self.call_runtime_void(
                "py_dict_set_item",
                &[
                    format!("ptr {}", dict),
                    format!("ptr {}", kb.repr),
                    format!("ptr {}", vb.repr),
                ],
            )?;
        }
        Ok(Value::boxed(dict, dict_ty))
    }

    // === Boxing, unboxing, coercion ===

    /// Upgrade a register value to a heap object. Idempotent.
    pub(super) fn ensure_boxed(&mut self, v: &Value, loc: Loc) -> Result<Value, CodeGenError> {
        if v.boxed {
            return Ok(v.clone());
        }
        let ty = v.ty.clone();
        let md = self.boxed_metadata(&ty);
        let out = if ty.is_int() {
            let out = self.call_runtime_with_metadata(
                "py_create_int",
                "ptr",
                &[format!("i32 {}", v.repr)],
                &md,
            )?;
            self.scopes.track_temp(&out);
            out
        } else if ty.is_double() {
            let out = self.call_runtime_with_metadata(
                "py_create_double",
                "ptr",
                &[format!("double {}", v.repr)],
                &md,
            )?;
            self.scopes.track_temp(&out);
            out
        } else if ty.is_bool() {
            let out = self.call_runtime_with_metadata(
                "py_create_bool",
                "ptr",
                &[format!("i1 {}", v.repr)],
                &md,
            )?;
            self.scopes.track_temp(&out);
            out
        } else if ty.is_none() {
            self.call_runtime("py_get_none", "ptr", &[])?
        } else {
            return Err(CodeGenError::logic(
                loc,
                format!("cannot box value of type '{}'", ty.name()),
            ));
        };
        Ok(Value::boxed(out, ty))
    }

    /// The inverse of [`CodeGen::ensure_boxed`]: read the primitive payload
    /// out of a boxed value of known primitive type. Idempotent.
    pub(super) fn extract_primitive(
        &mut self,
        v: &Value,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        if !v.boxed {
            return Ok(v.clone());
        }
        let (helper, ret): (&'static str, &str) = if v.ty.is_int() {
            ("py_extract_int", "i32")
        } else if v.ty.is_double() {
            ("py_extract_double", "double")
        } else if v.ty.is_bool() {
            ("py_extract_bool", "i1")
        } else {
            return Err(CodeGenError::logic(
                loc,
                format!("cannot extract primitive from '{}'", v.ty.name()),
            ));
        };
        let out = self.call_runtime(helper, ret, &[format!("ptr {}", v.repr)])?;
        Ok(Value::unboxed(out, v.ty.clone()))
    }

    /// Produce an unboxed operand of the target primitive type, inserting
    /// widening, extraction, or dynamic conversion as needed.
    pub(super) fn coerce_to_unboxed(
        &mut self,
        v: &Value,
        target: &PyType,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        if !v.boxed {
            if v.ty.equals(target) {
                return Ok(v.clone());
            }
            if v.ty.is_int() && target.is_double() {
                let out = self.fresh_temp();
                self.emit(&format!("{} = sitofp i32 {} to double", out, v.repr))?;
                return Ok(Value::unboxed(out, target.clone()));
            }
            if v.ty.is_bool() && target.is_int() {
                let out = self.fresh_temp();
                self.emit(&format!("{} = zext i1 {} to i32", out, v.repr))?;
                return Ok(Value::unboxed(out, target.clone()));
            }
            if v.ty.is_bool() && target.is_double() {
                let out = self.fresh_temp();
                self.emit(&format!("{} = uitofp i1 {} to double", out, v.repr))?;
                return Ok(Value::unboxed(out, target.clone()));
            }
        } else {
            if v.ty.is_any() {
                return self.unbox_any_to(v, target);
            }
            if v.ty.equals(target) {
                return self.extract_primitive(v, loc);
            }
            if v.ty.is_int() && target.is_double() {
                let int_val = self.extract_primitive(v, loc)?;
                let out = self.fresh_temp();
                self.emit(&format!("{} = sitofp i32 {} to double", out, int_val.repr))?;
                return Ok(Value::unboxed(out, target.clone()));
            }
            if v.ty.is_bool() && target.is_int() {
                let bool_val = self.extract_primitive(v, loc)?;
                let out = self.fresh_temp();
                self.emit(&format!("{} = zext i1 {} to i32", out, bool_val.repr))?;
                return Ok(Value::unboxed(out, target.clone()));
            }
        }
        Err(CodeGenError::type_error(
            loc,
            format!("cannot convert '{}' to '{}'", v.ty.name(), target.name()),
        ))
    }

    /// Dynamic cast: convert a boxed `any` to a primitive via the runtime,
    /// releasing the intermediate box immediately.
    fn unbox_any_to(&mut self, v: &Value, target: &PyType) -> Result<Value, CodeGenError> {
        let (conv, helper, ret): (&'static str, &'static str, &str) = if target.is_int() {
            ("py_convert_any_to_int", "py_extract_int", "i32")
        } else if target.is_double() {
            ("py_convert_any_to_double", "py_extract_double", "double")
        } else if target.is_bool() {
            ("py_convert_any_to_bool", "py_extract_bool", "i1")
        } else {
            return Err(CodeGenError::logic(
                Loc::default(),
                format!("cannot unbox 'any' to '{}'", target.name()),
            ));
        };
        let converted = self.call_runtime(conv, "ptr", &[format!("ptr {}", v.repr)])?;
        let out = self.call_runtime(helper, ret, &[format!("ptr {}", converted)])?;
        self.call_runtime_void("py_decref", &[format!("ptr {}", converted)])?;
        Ok(Value::unboxed(out, target.clone()))
    }

    /// Produce a boxed operand suitable for a slot or parameter of `target`
    /// type, converting `int` -> `double` through the registry's conversion
    /// helper when required.
    pub(super) fn coerce_to_boxed(
        &mut self,
        v: Value,
        target: &PyType,
        loc: Loc,
    ) -> Result<Value, CodeGenError> {
        if target.is_double() && v.ty.is_int() {
            if v.boxed {
                let conv = typeops::conversion_fn(v.ty.id(), target.id())
                    .expect("int -> double conversion is registered");
                let md = self.boxed_metadata(target);
                let out = self.call_runtime_with_metadata(
                    conv,
                    "ptr",
                    &[format!("ptr {}", v.repr)],
                    &md,
                )?;
                self.scopes.track_temp(&out);
                return Ok(Value::boxed(out, target.clone()));
            }
            let widened = self.coerce_to_unboxed(&v, target, loc)?;
            return self.ensure_boxed(&widened, loc);
        }
        self.ensure_boxed(&v, loc)
    }

    // === Conditions ===

    /// Evaluate an expression as an `i1` condition operand.
    pub(super) fn codegen_condition(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        let v = self.codegen_expr(expr)?;
        self.condition_operand(&v)
    }

    /// Turn a value into an `i1` truth test.
    pub(super) fn condition_operand(&mut self, v: &Value) -> Result<String, CodeGenError> {
        if !v.boxed {
            if v.ty.is_bool() {
                return Ok(v.repr.clone());
            }
            if v.ty.is_int() {
                let out = self.fresh_temp();
                self.emit(&format!("{} = icmp ne i32 {}, 0", out, v.repr))?;
                return Ok(out);
            }
            if v.ty.is_double() {
                let out = self.fresh_temp();
                self.emit(&format!(
                    "{} = fcmp one double {}, 0x0000000000000000",
                    out, v.repr
                ))?;
                return Ok(out);
            }
        }
        if v.ty.is_none() {
            return Ok("false".to_string());
        }
        if v.boxed && v.ty.is_bool() {
            let out = self.call_runtime("py_extract_bool", "i1", &[format!("ptr {}", v.repr)])?;
            return Ok(out);
        }
        if v.boxed && (v.ty.is_int() || v.ty.is_double()) {
            let prim = self.extract_primitive(v, Loc::default())?;
            return self.condition_operand(&prim);
        }
        // Reference or dynamic values take the runtime truthiness path; the
        // intermediate boxed bool never escapes the current block.
        let converted =
            self.call_runtime("py_convert_any_to_bool", "ptr", &[format!("ptr {}", v.repr)])?;
        let out = self.call_runtime("py_extract_bool", "i1", &[format!("ptr {}", converted)])?;
        self.call_runtime_void("py_decref", &[format!("ptr {}", converted)])?;
        Ok(out)
    }
}

/// The common static type of a literal's elements: the shared type if all
/// elements agree, `any` otherwise (or for an empty literal).
fn common_type(values: &[Value]) -> PyType {
    match values.first() {
        None => PyType::any(),
        Some(first) => {
            if values.iter().all(|v| v.ty.equals(&first.ty)) {
                first.ty.clone()
            } else {
                PyType::any()
            }
        }
    }
}
