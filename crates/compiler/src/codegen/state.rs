//! CodeGen state and core types.

use super::error::CodeGenError;
use super::scope::ScopeStack;
use crate::types::PyType;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

/// An SSA-level value: the operand text as it appears in the IR (an SSA name
/// like `%t3` or an immediate like `5`), its Python type, and whether it is
/// a heap pointer or an unboxed primitive.
#[derive(Debug, Clone)]
pub struct Value {
    pub repr: String,
    pub ty: PyType,
    pub boxed: bool,
}

impl Value {
    pub fn unboxed(repr: impl Into<String>, ty: PyType) -> Self {
        Value {
            repr: repr.into(),
            ty,
            boxed: false,
        }
    }

    pub fn boxed(repr: impl Into<String>, ty: PyType) -> Self {
        Value {
            repr: repr.into(),
            ty,
            boxed: true,
        }
    }
}

/// Signature of a compiled function, recorded when the definition is seen so
/// later call sites can coerce arguments and adopt the return type.
#[derive(Debug, Clone)]
pub struct FnSig {
    /// LLVM symbol (usually the source name; `Class.method` for methods)
    pub symbol: String,
    pub params: Vec<PyType>,
    pub return_type: PyType,
}

/// Loop context for `break`/`continue`.
#[derive(Debug, Clone)]
pub(super) struct LoopBlocks {
    pub continue_target: String,
    pub break_target: String,
    /// Scope depth at loop entry; exits drain temporaries of deeper frames
    pub scope_depth: usize,
}

/// The function currently being emitted.
#[derive(Debug, Clone)]
pub(super) struct CurrentFn {
    pub name: String,
    pub return_type: PyType,
}

pub struct CodeGen {
    /// Finished function definitions
    pub(super) functions_ir: String,
    /// Allocas for the function being emitted (hoisted into its entry block)
    pub(super) alloca_buffer: String,
    /// Instruction body for the function being emitted
    pub(super) body: String,
    /// String constant globals
    pub(super) globals: String,
    pub(super) string_constants: HashMap<String, String>,
    pub(super) string_counter: usize,
    pub(super) temp_counter: usize,
    pub(super) block_counter: usize,
    pub(super) slot_counter: usize,
    pub(super) scopes: ScopeStack,
    /// Runtime symbols referenced so far; declared at module assembly
    pub(super) used_runtime: BTreeSet<&'static str>,
    /// Known function signatures by source name
    pub(super) functions: HashMap<String, FnSig>,
    /// Functions whose bodies have been emitted (duplicate detection)
    pub(super) emitted_functions: HashSet<String>,
    pub(super) current_fn: Option<CurrentFn>,
    pub(super) loop_stack: Vec<LoopBlocks>,
    /// Whether the current basic block already ends in a terminator
    pub(super) block_terminated: bool,
    /// Label of the block instructions are currently appended to
    pub(super) current_block: String,
    /// Interned `!N = !{...}` metadata nodes, keyed by their content
    pub(super) metadata_nodes: BTreeMap<String, usize>,
    /// Errors accumulated across function boundaries (emission recovers at
    /// statement boundaries so one module reports every failing function)
    pub(super) errors: Vec<crate::error::CompilationError>,
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            functions_ir: String::new(),
            alloca_buffer: String::new(),
            body: String::new(),
            globals: String::new(),
            string_constants: HashMap::new(),
            string_counter: 0,
            temp_counter: 0,
            block_counter: 0,
            slot_counter: 0,
            scopes: ScopeStack::new(),
            used_runtime: BTreeSet::new(),
            functions: HashMap::new(),
            emitted_functions: HashSet::new(),
            current_fn: None,
            loop_stack: Vec::new(),
            block_terminated: false,
            current_block: "entry".to_string(),
            metadata_nodes: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Fresh SSA temporary name.
    pub(super) fn fresh_temp(&mut self) -> String {
        let name = format!("%t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    /// Fresh basic block label.
    pub(super) fn fresh_block(&mut self, prefix: &str) -> String {
        let name = format!("{}.{}", prefix, self.block_counter);
        self.block_counter += 1;
        name
    }

    /// Fresh stack-slot name for a variable. Slot names stay unique even
    /// when shadowed block scopes reuse a source name.
    pub(super) fn fresh_slot(&mut self, var_name: &str) -> String {
        let name = format!("%{}.addr.{}", var_name, self.slot_counter);
        self.slot_counter += 1;
        name
    }

    /// Append one instruction line to the current block.
    pub(super) fn emit(&mut self, line: &str) -> Result<(), CodeGenError> {
        writeln!(&mut self.body, "  {}", line)?;
        Ok(())
    }

    /// Start a new basic block.
    pub(super) fn emit_label(&mut self, label: &str) -> Result<(), CodeGenError> {
        writeln!(&mut self.body, "{}:", label)?;
        self.current_block = label.to_string();
        self.block_terminated = false;
        Ok(())
    }

    /// Append a terminator to the current block.
    pub(super) fn emit_terminator(&mut self, line: &str) -> Result<(), CodeGenError> {
        writeln!(&mut self.body, "  {}", line)?;
        self.block_terminated = true;
        Ok(())
    }

    /// Branch to `target` unless the block already terminated.
    pub(super) fn branch_to(&mut self, target: &str) -> Result<(), CodeGenError> {
        if !self.block_terminated {
            self.emit_terminator(&format!("br label %{}", target))?;
        }
        Ok(())
    }

    /// Hoist an alloca into the entry block of the current function.
    pub(super) fn emit_alloca(&mut self, slot: &str, llvm_ty: &str) -> Result<(), CodeGenError> {
        writeln!(&mut self.alloca_buffer, "  {} = alloca {}", slot, llvm_ty)?;
        Ok(())
    }

    /// Intern a metadata node with the given content, returning its `!N` ref.
    pub(super) fn metadata_node(&mut self, content: &str) -> String {
        let next = self.metadata_nodes.len();
        let idx = *self
            .metadata_nodes
            .entry(content.to_string())
            .or_insert(next);
        format!("!{}", idx)
    }
}
