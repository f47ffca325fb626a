//! Control-flow lowering: if/elif/else, while/else, for/else, break and
//! continue.
//!
//! Loops with an `else` clause branch to the else block on normal exit and
//! to the post-loop block on `break` (Python semantics). `break` and
//! `continue` drain the temporaries of every scope frame they jump out of
//! before branching, then open a fresh dead block to absorb stray code.

use super::error::CodeGenError;
use super::scope::VarSlot;
use super::state::{CodeGen, LoopBlocks};
use crate::ast::{Expr, Loc, Stmt};
use crate::types::PyType;

impl CodeGen {
    pub(super) fn codegen_if(
        &mut self,
        cond: &Expr,
        then_block: &[Stmt],
        else_block: Option<&[Stmt]>,
    ) -> Result<(), CodeGenError> {
        let then_label = self.fresh_block("if.then");
        let else_label = self.fresh_block("if.else");
        let end_label = self.fresh_block("if.end");

        let c = self.codegen_condition(cond)?;
        let false_target = if else_block.is_some() {
            &else_label
        } else {
            &end_label
        };
        self.emit_terminator(&format!(
            "br i1 {}, label %{}, label %{}",
            c, then_label, false_target
        ))?;

        self.emit_label(&then_label)?;
        self.codegen_scoped_block(then_block)?;
        self.branch_to(&end_label)?;

        if let Some(eb) = else_block {
            self.emit_label(&else_label)?;
            self.codegen_scoped_block(eb)?;
            self.branch_to(&end_label)?;
        }

        self.emit_label(&end_label)
    }

    pub(super) fn codegen_while(
        &mut self,
        cond: &Expr,
        body: &[Stmt],
        else_block: Option<&[Stmt]>,
    ) -> Result<(), CodeGenError> {
        let cond_label = self.fresh_block("while.cond");
        let body_label = self.fresh_block("while.body");
        let else_label = self.fresh_block("while.else");
        let end_label = self.fresh_block("while.end");

        self.branch_to(&cond_label)?;
        self.emit_label(&cond_label)?;

        // Condition temporaries are drained before the branch, every
        // iteration.
        self.push_scope();
        let c = self.codegen_condition(cond)?;
        self.pop_scope()?;

        let exit_target = if else_block.is_some() {
            &else_label
        } else {
            &end_label
        };
        self.emit_terminator(&format!(
            "br i1 {}, label %{}, label %{}",
            c, body_label, exit_target
        ))?;

        self.loop_stack.push(LoopBlocks {
            continue_target: cond_label.clone(),
            break_target: end_label.clone(),
            scope_depth: self.scopes.depth(),
        });
        self.emit_label(&body_label)?;
        self.codegen_scoped_block(body)?;
        self.loop_stack.pop();
        self.branch_to(&cond_label)?;

        if let Some(eb) = else_block {
            self.emit_label(&else_label)?;
            self.codegen_scoped_block(eb)?;
            self.branch_to(&end_label)?;
        }

        self.emit_label(&end_label)
    }

    /// `for` lowers to a while over the runtime iterator protocol:
    /// `py_get_iter` then `py_iter_next` until the null sentinel.
    pub(super) fn codegen_for(
        &mut self,
        var: &str,
        iterable: &Expr,
        body: &[Stmt],
        else_block: Option<&[Stmt]>,
        loc: Loc,
    ) -> Result<(), CodeGenError> {
        let it = self.codegen_expr(iterable)?;
        if !(it.ty.is_iterable() || it.ty.is_any()) {
            return Err(CodeGenError::type_error(
                loc,
                format!("'{}' is not iterable", it.ty.name()),
            ));
        }
        let iter = self.call_runtime("py_get_iter", "ptr", &[format!("ptr {}", it.repr)])?;
        self.scopes.track_temp(&iter);

        // The loop variable binds boxed values of unknown element type and
        // stays visible after the loop.
        let slot = match self.scopes.lookup(var).cloned() {
            Some(existing) if existing.boxed => {
                let slot = VarSlot {
                    ptr: existing.ptr,
                    ty: PyType::any(),
                    boxed: true,
                };
                self.scopes.define(var, slot.clone());
                slot
            }
            Some(_) => {
                return Err(CodeGenError::type_error(
                    loc,
                    format!("loop variable '{}' already holds an unboxed primitive", var),
                ));
            }
            None => {
                let ptr = self.fresh_slot(var);
                self.emit_alloca(&ptr, "ptr")?;
                let none = self.call_runtime("py_get_none", "ptr", &[])?;
                self.emit(&format!("store ptr {}, ptr {}", none, ptr))?;
                let slot = VarSlot {
                    ptr,
                    ty: PyType::any(),
                    boxed: true,
                };
                self.scopes.define(var, slot.clone());
                slot
            }
        };

        let cond_label = self.fresh_block("for.cond");
        let body_label = self.fresh_block("for.body");
        let else_label = self.fresh_block("for.else");
        let end_label = self.fresh_block("for.end");

        self.branch_to(&cond_label)?;
        self.emit_label(&cond_label)?;
        let next = self.call_runtime("py_iter_next", "ptr", &[format!("ptr {}", iter)])?;
        let done = self.fresh_temp();
        self.emit(&format!("{} = icmp eq ptr {}, null", done, next))?;
        let exit_target = if else_block.is_some() {
            &else_label
        } else {
            &end_label
        };
        self.emit_terminator(&format!(
            "br i1 {}, label %{}, label %{}",
            done, exit_target, body_label
        ))?;

        self.loop_stack.push(LoopBlocks {
            continue_target: cond_label.clone(),
            break_target: end_label.clone(),
            scope_depth: self.scopes.depth(),
        });
        self.emit_label(&body_label)?;
        // Bind the element: the iterator hands over one owned reference,
        // which replaces whatever the variable held.
        let old = self.fresh_temp();
        self.emit(&format!("{} = load ptr, ptr {}", old, slot.ptr))?;
        self.call_runtime_void("py_decref", &[format!("ptr {}", old)])?;
        self.emit(&format!("store ptr {}, ptr {}", next, slot.ptr))?;

        self.codegen_scoped_block(body)?;
        self.loop_stack.pop();
        self.branch_to(&cond_label)?;

        if let Some(eb) = else_block {
            self.emit_label(&else_label)?;
            self.codegen_scoped_block(eb)?;
            self.branch_to(&end_label)?;
        }

        self.emit_label(&end_label)
    }

    pub(super) fn codegen_break(&mut self, loc: Loc) -> Result<(), CodeGenError> {
        let Some(info) = self.loop_stack.last().cloned() else {
            return Err(CodeGenError::logic(loc, "'break' outside of a loop"));
        };
        let temps = self.scopes.temps_below(info.scope_depth);
        self.emit_decrefs(&temps)?;
        self.emit_terminator(&format!("br label %{}", info.break_target))?;
        let dead = self.fresh_block("dead");
        self.emit_label(&dead)
    }

    pub(super) fn codegen_continue(&mut self, loc: Loc) -> Result<(), CodeGenError> {
        let Some(info) = self.loop_stack.last().cloned() else {
            return Err(CodeGenError::logic(loc, "'continue' outside of a loop"));
        };
        let temps = self.scopes.temps_below(info.scope_depth);
        self.emit_decrefs(&temps)?;
        self.emit_terminator(&format!("br label %{}", info.continue_target))?;
        let dead = self.fresh_block("dead");
        self.emit_label(&dead)
    }
}
