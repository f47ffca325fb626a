//! Python type -> LLVM type mapping and IR type metadata.
//!
//! LLVM opaque pointers erase Python types, so every boxed value the
//! generator produces carries instruction metadata (`!py_type_id`,
//! `!py_is_reference`, `!py_container_type`). Downstream consumers read the
//! metadata first and fall back to `py_get_object_type_id` at runtime. All
//! metadata reads and writes go through the helpers here.

use super::error::CodeGenError;
use super::state::CodeGen;
use crate::ast::Loc;
use crate::types::PyType;

/// LLVM type for a value of the given Python type. Reference types are
/// opaque pointers.
pub(super) fn llvm_type(ty: &PyType) -> &'static str {
    if ty.is_int() {
        "i32"
    } else if ty.is_double() {
        "double"
    } else if ty.is_bool() {
        "i1"
    } else {
        "ptr"
    }
}

/// LLVM return type for a function returning the given Python type.
/// `None` returns lower to `void`.
pub(super) fn llvm_return_type(ty: &PyType) -> &'static str {
    if ty.is_none() {
        "void"
    } else {
        llvm_type(ty)
    }
}

/// Render an f64 as an LLVM hexadecimal floating-point constant. The hex
/// form is always exactly representable, unlike decimal spellings.
pub(super) fn double_literal(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}

/// Zero/default operand for a primitive type.
pub(super) fn default_primitive(ty: &PyType) -> Option<&'static str> {
    if ty.is_int() {
        Some("0")
    } else if ty.is_double() {
        Some("0x0000000000000000")
    } else if ty.is_bool() {
        Some("0")
    } else {
        None
    }
}

impl CodeGen {
    /// Metadata suffix attached to instructions producing boxed values:
    /// `, !py_type_id !N, !py_is_reference !M` plus `!py_container_type`
    /// for containers.
    pub(super) fn boxed_metadata(&mut self, ty: &PyType) -> String {
        let type_node = self.metadata_node(&format!("!{{i32 {}}}", ty.id()));
        let ref_node = self.metadata_node(&format!(
            "!{{i32 {}}}",
            if ty.is_reference() { 1 } else { 0 }
        ));
        let mut suffix = format!(", !py_type_id {}, !py_is_reference {}", type_node, ref_node);
        if ty.is_container() {
            let container_node = self.metadata_node(&format!("!{{i32 {}}}", ty.base_id()));
            suffix.push_str(&format!(", !py_container_type {}", container_node));
        }
        suffix
    }

    /// Emit the interned metadata node definitions, ordered by index.
    pub(super) fn emit_metadata_nodes(&self, out: &mut String) {
        if self.metadata_nodes.is_empty() {
            return;
        }
        let mut nodes: Vec<(usize, &str)> = self
            .metadata_nodes
            .iter()
            .map(|(content, &idx)| (idx, content.as_str()))
            .collect();
        nodes.sort_by_key(|&(idx, _)| idx);
        for (idx, content) in nodes {
            out.push_str(&format!("!{} = {}\n", idx, content));
        }
    }

    /// Parse an integer literal into an `i32` operand.
    pub(super) fn int_literal_operand(
        &self,
        text: &str,
        loc: Loc,
    ) -> Result<String, CodeGenError> {
        text.parse::<i32>()
            .map(|v| v.to_string())
            .map_err(|_| CodeGenError::logic(loc, format!("integer literal '{}' out of range", text)))
    }

    /// Parse a float literal into a double operand.
    pub(super) fn double_literal_operand(
        &self,
        text: &str,
        loc: Loc,
    ) -> Result<String, CodeGenError> {
        text.parse::<f64>()
            .map(double_literal)
            .map_err(|_| CodeGenError::logic(loc, format!("invalid float literal '{}'", text)))
    }
}
