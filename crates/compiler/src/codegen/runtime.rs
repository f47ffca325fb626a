//! Runtime ABI declarations.
//!
//! The code generator only calls documented runtime symbols; their C
//! implementation lives in a separate library. All declarations sit in one
//! data-driven table and are declared lazily: a symbol is added to the
//! module's `declare` section the first time it is called. All object
//! pointers are opaque `ptr`.

use super::error::CodeGenError;
use super::state::CodeGen;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Runtime symbol -> full LLVM `declare` line.
pub static RUNTIME_DECLARATIONS: LazyLock<BTreeMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        BTreeMap::from([
            // Reference counting
            ("py_incref", "declare void @py_incref(ptr)"),
            ("py_decref", "declare void @py_decref(ptr)"),
            // Boxing
            ("py_create_int", "declare ptr @py_create_int(i32)"),
            ("py_create_double", "declare ptr @py_create_double(double)"),
            ("py_create_bool", "declare ptr @py_create_bool(i1)"),
            ("py_create_string", "declare ptr @py_create_string(ptr)"),
            // Unboxing
            ("py_extract_int", "declare i32 @py_extract_int(ptr)"),
            ("py_extract_double", "declare double @py_extract_double(ptr)"),
            ("py_extract_bool", "declare i1 @py_extract_bool(ptr)"),
            // Lists
            ("py_create_list", "declare ptr @py_create_list(i32, i32)"),
            ("py_list_len", "declare i32 @py_list_len(ptr)"),
            ("py_list_get_item", "declare ptr @py_list_get_item(ptr, i32)"),
            (
                "py_list_get_item_with_type",
                "declare ptr @py_list_get_item_with_type(ptr, i32, ptr)",
            ),
            (
                "py_list_set_item",
                "declare void @py_list_set_item(ptr, i32, ptr)",
            ),
            ("py_list_append", "declare ptr @py_list_append(ptr, ptr)"),
            ("py_list_copy", "declare ptr @py_list_copy(ptr)"),
            // Dicts
            ("py_create_dict", "declare ptr @py_create_dict(i32, i32)"),
            ("py_dict_len", "declare i32 @py_dict_len(ptr)"),
            ("py_dict_get_item", "declare ptr @py_dict_get_item(ptr, ptr)"),
            (
                "py_dict_set_item",
                "declare void @py_dict_set_item(ptr, ptr, ptr)",
            ),
            ("py_dict_keys", "declare ptr @py_dict_keys(ptr)"),
            // Strings
            (
                "py_string_get_char",
                "declare ptr @py_string_get_char(ptr, i32)",
            ),
            // Generic object arithmetic
            ("py_object_add", "declare ptr @py_object_add(ptr, ptr)"),
            (
                "py_object_subtract",
                "declare ptr @py_object_subtract(ptr, ptr)",
            ),
            (
                "py_object_multiply",
                "declare ptr @py_object_multiply(ptr, ptr)",
            ),
            ("py_object_divide", "declare ptr @py_object_divide(ptr, ptr)"),
            ("py_object_modulo", "declare ptr @py_object_modulo(ptr, ptr)"),
            (
                "py_object_compare",
                "declare ptr @py_object_compare(ptr, ptr, i32)",
            ),
            // Conversions
            (
                "py_convert_int_to_double",
                "declare ptr @py_convert_int_to_double(ptr)",
            ),
            (
                "py_convert_double_to_int",
                "declare ptr @py_convert_double_to_int(ptr)",
            ),
            (
                "py_convert_any_to_int",
                "declare ptr @py_convert_any_to_int(ptr)",
            ),
            (
                "py_convert_any_to_double",
                "declare ptr @py_convert_any_to_double(ptr)",
            ),
            (
                "py_convert_any_to_bool",
                "declare ptr @py_convert_any_to_bool(ptr)",
            ),
            (
                "py_convert_any_to_string",
                "declare ptr @py_convert_any_to_string(ptr)",
            ),
            (
                "py_convert_any_preserve_type",
                "declare ptr @py_convert_any_preserve_type(ptr)",
            ),
            // Runtime type information
            (
                "py_get_object_type_id",
                "declare i32 @py_get_object_type_id(ptr)",
            ),
            ("py_check_type", "declare i1 @py_check_type(ptr, i32)"),
            (
                "py_raise_type_error",
                "declare void @py_raise_type_error(i32, i32)",
            ),
            // Copy semantics
            ("py_object_copy", "declare ptr @py_object_copy(ptr, i32)"),
            (
                "py_object_deep_copy",
                "declare ptr @py_object_deep_copy(ptr, i32)",
            ),
            // Canonical None
            ("py_get_none", "declare ptr @py_get_none()"),
            // Printing
            ("py_print_int", "declare void @py_print_int(i32)"),
            ("py_print_double", "declare void @py_print_double(double)"),
            ("py_print_bool", "declare void @py_print_bool(i1)"),
            ("py_print_string", "declare void @py_print_string(ptr)"),
            ("py_print_object", "declare void @py_print_object(ptr)"),
            // Iterator protocol
            ("py_get_iter", "declare ptr @py_get_iter(ptr)"),
            ("py_iter_next", "declare ptr @py_iter_next(ptr)"),
            // Module/class placeholders
            ("py_import_module", "declare ptr @py_import_module(ptr)"),
            ("py_create_class", "declare ptr @py_create_class(ptr)"),
            (
                "py_add_base_class",
                "declare void @py_add_base_class(ptr, ptr)",
            ),
            ("py_add_method", "declare void @py_add_method(ptr, ptr, ptr)"),
            // LLVM intrinsics used by the primitive fast paths
            ("llvm.pow.f64", "declare double @llvm.pow.f64(double, double)"),
            ("llvm.floor.f64", "declare double @llvm.floor.f64(double)"),
        ])
    });

impl CodeGen {
    /// Record that a runtime symbol is used so the module assembly declares
    /// it.
    pub(super) fn mark_runtime_used(&mut self, name: &'static str) {
        debug_assert!(
            RUNTIME_DECLARATIONS.contains_key(name),
            "unknown runtime symbol {}",
            name
        );
        self.used_runtime.insert(name);
    }

    /// Call a value-returning runtime helper. `args` are full typed
    /// operands, e.g. `["ptr %t0", "i32 5"]`.
    pub(super) fn call_runtime(
        &mut self,
        name: &'static str,
        ret: &str,
        args: &[String],
    ) -> Result<String, CodeGenError> {
        self.mark_runtime_used(name);
        let result = self.fresh_temp();
        self.emit(&format!(
            "{} = call {} @{}({})",
            result,
            ret,
            name,
            args.join(", ")
        ))?;
        Ok(result)
    }

    /// Call a value-returning runtime helper with instruction metadata
    /// appended (used for boxed values carrying `!py_type_id`).
    pub(super) fn call_runtime_with_metadata(
        &mut self,
        name: &'static str,
        ret: &str,
        args: &[String],
        metadata: &str,
    ) -> Result<String, CodeGenError> {
        self.mark_runtime_used(name);
        let result = self.fresh_temp();
        self.emit(&format!(
            "{} = call {} @{}({}){}",
            result,
            ret,
            name,
            args.join(", "),
            metadata
        ))?;
        Ok(result)
    }

    /// Call a void runtime helper.
    pub(super) fn call_runtime_void(
        &mut self,
        name: &'static str,
        args: &[String],
    ) -> Result<(), CodeGenError> {
        self.mark_runtime_used(name);
        self.emit(&format!("call void @{}({})", name, args.join(", ")))?;
        Ok(())
    }

    /// Emit `declare` lines for every runtime symbol used so far.
    pub(super) fn emit_runtime_declarations(&self, out: &mut String) {
        if self.used_runtime.is_empty() {
            return;
        }
        out.push_str("; Runtime function declarations\n");
        for name in &self.used_runtime {
            if let Some(decl) = RUNTIME_DECLARATIONS.get(name) {
                out.push_str(decl);
                out.push('\n');
            }
        }
        out.push('\n');
    }
}
