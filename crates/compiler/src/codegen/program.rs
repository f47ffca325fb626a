//! Module assembly and structural verification.
//!
//! Top-level function definitions emit as LLVM functions; the remaining
//! top-level statements compile into a synthetic `main` returning `i32 0`.
//! Emission recovers at function and top-level statement boundaries so one
//! run reports every failing location. On success the assembled IR is
//! passed through a structural verifier (every basic block ends in exactly
//! one terminator) before it is returned; nothing is emitted on error.

use super::error::CodeGenError;
use super::state::{CodeGen, CurrentFn};
use crate::ast::{Module, Stmt, StmtKind};
use crate::error::CompilationError;
use crate::types::PyType;

/// Target triple for the host platform, matching what clang expects when
/// assembling the emitted IR.
pub(super) fn target_triple() -> &'static str {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "arm64-apple-macosx"
    } else if cfg!(target_os = "macos") {
        "x86_64-apple-macosx"
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        "aarch64-unknown-linux-gnu"
    } else {
        "x86_64-unknown-linux-gnu"
    }
}

impl CodeGen {
    /// Generate textual LLVM IR for a whole module. On failure, every
    /// accumulated diagnostic is returned and no IR is produced.
    pub fn generate_module(&mut self, module: &Module) -> Result<String, Vec<CompilationError>> {
        // Signatures first, so call sites may precede definitions.
        for stmt in &module.statements {
            match &stmt.kind {
                StmtKind::FunctionDef(func) => {
                    if let Err(e) = self.register_function(func) {
                        self.errors.push(e.into_compilation_error());
                    }
                }
                StmtKind::Class(class) => {
                    for method in &class.methods {
                        if let Err(e) = self.register_function(method) {
                            self.errors.push(e.into_compilation_error());
                        }
                    }
                }
                _ => {}
            }
        }

        let mut entry_statements: Vec<&Stmt> = Vec::new();
        for stmt in &module.statements {
            if let StmtKind::FunctionDef(func) = &stmt.kind {
                if let Err(e) = self.codegen_function(func) {
                    self.errors.push(e.into_compilation_error());
                }
            } else {
                entry_statements.push(stmt);
            }
        }

        if !entry_statements.is_empty() {
            if self.functions.contains_key("main") {
                self.errors.push(CompilationError::codegen(
                    entry_statements[0].loc.line,
                    entry_statements[0].loc.column,
                    "module-level statements conflict with a function named 'main'",
                ));
            } else if let Err(e) = self.codegen_entry(&entry_statements) {
                self.errors.push(e.into_compilation_error());
            }
        }

        if !self.errors.is_empty() {
            return Err(std::mem::take(&mut self.errors));
        }

        let ir = match self.assemble(module) {
            Ok(ir) => ir,
            Err(e) => return Err(vec![e.into_compilation_error()]),
        };

        let failures = verify_module(&ir);
        if !failures.is_empty() {
            return Err(failures
                .into_iter()
                .map(|msg| {
                    CompilationError::codegen(0, 0, format!("module verification failed: {}", msg))
                })
                .collect());
        }

        Ok(ir)
    }

    /// Emit the synthetic `main` holding the module's top-level statements.
    fn codegen_entry(&mut self, statements: &[&Stmt]) -> Result<(), CodeGenError> {
        self.current_fn = Some(CurrentFn {
            name: "main".to_string(),
            return_type: PyType::int(),
        });
        self.current_block = "entry".to_string();
        self.block_terminated = false;
        self.push_scope();

        for stmt in statements {
            if let Err(e) = self.codegen_stmt(stmt) {
                // Recover at the statement boundary to keep reporting.
                self.errors.push(e.into_compilation_error());
            }
        }

        if !self.block_terminated {
            let temps = self.scopes.all_temps();
            self.emit_decrefs(&temps)?;
            self.emit_terminator("ret i32 0")?;
        }
        self.pop_scope_silent();
        self.current_fn = None;

        let allocas = std::mem::take(&mut self.alloca_buffer);
        let body = std::mem::take(&mut self.body);
        self.functions_ir.push_str(&format!(
            "define i32 @main() {{\nentry:\n{}{}}}\n\n",
            allocas, body
        ));
        Ok(())
    }

    fn assemble(&mut self, module: &Module) -> Result<String, CodeGenError> {
        let mut ir = String::new();
        ir.push_str(&format!("; ModuleID = '{}'\n", module.name));
        ir.push_str(&format!("source_filename = \"{}\"\n", module.name));
        ir.push_str(&format!("target triple = \"{}\"\n\n", target_triple()));

        if !self.globals.is_empty() {
            ir.push_str(&self.globals);
            ir.push('\n');
        }

        self.emit_runtime_declarations(&mut ir);

        ir.push_str(&self.functions_ir);

        self.emit_metadata_nodes(&mut ir);
        Ok(ir)
    }
}

/// Structural verification of emitted IR: inside every `define`, each basic
/// block must end with exactly one terminator.
pub(super) fn verify_module(ir: &str) -> Vec<String> {
    let mut failures = Vec::new();
    let mut in_function = false;
    let mut current_fn = String::new();
    let mut current_block = String::new();
    let mut block_terminated = false;
    let mut block_has_instructions = false;

    let is_terminator = |line: &str| {
        let t = line.trim_start();
        t.starts_with("ret ")
            || t == "ret void"
            || t.starts_with("br ")
            || t == "unreachable"
            || t.starts_with("switch ")
    };

    for line in ir.lines() {
        if !in_function {
            if line.starts_with("define ") {
                in_function = true;
                current_fn = line.to_string();
                current_block = String::new();
                block_terminated = false;
                block_has_instructions = false;
            }
            continue;
        }

        if line == "}" {
            if !block_terminated && (block_has_instructions || !current_block.is_empty()) {
                failures.push(format!(
                    "block '{}' in {} does not end with a terminator",
                    current_block, current_fn
                ));
            }
            in_function = false;
            continue;
        }

        if !line.starts_with(' ') && line.ends_with(':') {
            // New block label.
            if !current_block.is_empty() && !block_terminated {
                failures.push(format!(
                    "block '{}' in {} does not end with a terminator",
                    current_block, current_fn
                ));
            }
            current_block = line.trim_end_matches(':').to_string();
            block_terminated = false;
            block_has_instructions = false;
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        if block_terminated {
            failures.push(format!(
                "instruction after terminator in block '{}' of {}",
                current_block, current_fn
            ));
        }
        block_has_instructions = true;
        if is_terminator(line) {
            block_terminated = true;
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::verify_module;

    #[test]
    fn test_verify_accepts_terminated_blocks() {
        let ir = "define i32 @f() {\nentry:\n  %t0 = add i32 1, 2\n  ret i32 %t0\n}\n";
        assert!(verify_module(ir).is_empty());
    }

    #[test]
    fn test_verify_rejects_missing_terminator() {
        let ir = "define i32 @f() {\nentry:\n  %t0 = add i32 1, 2\n}\n";
        let failures = verify_module(ir);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("does not end with a terminator"));
    }

    #[test]
    fn test_verify_rejects_instruction_after_terminator() {
        let ir = "define void @f() {\nentry:\n  ret void\n  %t0 = add i32 1, 2\n}\n";
        let failures = verify_module(ir);
        assert!(!failures.is_empty());
        assert!(failures[0].contains("after terminator"));
    }

    #[test]
    fn test_verify_handles_multiple_blocks() {
        let ir = "define void @f() {\nentry:\n  br label %next\nnext:\n  ret void\n}\n";
        assert!(verify_module(ir).is_empty());
    }
}
