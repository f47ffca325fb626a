//! Scope stack and temporary heap-object tracking.
//!
//! One frame per function body, `if`/`while`/`for` arm, or class body.
//! Lookup walks outward; writes target the innermost frame unless the name
//! already exists in an enclosing frame, mirroring Python's local-by-default
//! assignment. Each frame also tracks the heap temporaries produced while it
//! was innermost, so the generator can emit the matching decrefs on every
//! exit path.

use super::error::CodeGenError;
use super::state::CodeGen;
use crate::types::PyType;
use std::collections::HashMap;

/// Storage for one variable: the stack slot holding it, its declared type,
/// and whether the slot holds a heap pointer or an unboxed primitive.
#[derive(Debug, Clone)]
pub(super) struct VarSlot {
    pub ptr: String,
    pub ty: PyType,
    pub boxed: bool,
}

#[derive(Debug, Default)]
struct Frame {
    vars: HashMap<String, VarSlot>,
    /// Heap pointers to decref when control leaves this frame
    temps: Vec<String>,
}

#[derive(Debug, Default)]
pub(super) struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { frames: Vec::new() }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pop the innermost frame, returning its tracked temporaries.
    pub fn pop(&mut self) -> Vec<String> {
        self.frames.pop().map(|f| f.temps).unwrap_or_default()
    }

    /// Walk outward for a variable.
    pub fn lookup(&self, name: &str) -> Option<&VarSlot> {
        self.frames.iter().rev().find_map(|f| f.vars.get(name))
    }

    /// Define a variable in the innermost frame.
    pub fn define(&mut self, name: &str, slot: VarSlot) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.to_string(), slot);
        }
    }

    /// Track a heap temporary in the innermost frame.
    pub fn track_temp(&mut self, operand: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.temps.push(operand.to_string());
        }
    }

    /// Temporaries of every frame strictly deeper than `depth`, innermost
    /// first. Used by `break`/`continue` to drain the frames they jump out
    /// of without popping them.
    pub fn temps_below(&self, depth: usize) -> Vec<String> {
        self.frames[depth.min(self.frames.len())..]
            .iter()
            .rev()
            .flat_map(|f| f.temps.iter().rev().cloned())
            .collect()
    }

    /// Temporaries of every live frame, innermost first. Used by `return`.
    pub fn all_temps(&self) -> Vec<String> {
        self.temps_below(0)
    }
}

impl CodeGen {
    /// Enter a new scope frame.
    pub(super) fn push_scope(&mut self) {
        self.scopes.push();
    }

    /// Leave the innermost scope, emitting decrefs for its temporaries.
    pub(super) fn pop_scope(&mut self) -> Result<(), CodeGenError> {
        let temps = self.scopes.pop();
        self.emit_decrefs(&temps)
    }

    /// Leave the innermost scope without emitting anything (used when the
    /// block already terminated on every path).
    pub(super) fn pop_scope_silent(&mut self) {
        self.scopes.pop();
    }

    /// Emit a `py_decref` for each tracked temporary.
    pub(super) fn emit_decrefs(&mut self, temps: &[String]) -> Result<(), CodeGenError> {
        for operand in temps {
            self.call_runtime_void("py_decref", &[format!("ptr {}", operand)])?;
        }
        Ok(())
    }
}
