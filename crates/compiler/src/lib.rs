//! Pylite compiler library.
//!
//! Compiles Pylite (a statically compiled, indentation-sensitive subset of
//! Python) to textual LLVM IR. The emitted module calls into a precompiled
//! C runtime (`py_*` symbols); an external toolchain links the two into an
//! executable.
//!
//! Pipeline: lexer -> token stream -> parser -> AST -> code generator ->
//! IR string. Data flows strictly forward; the type system and the
//! type-operation registry are consulted by the parser (annotations) and
//! the code generator (dispatch).
//!
//! ```rust,ignore
//! use pylitec::{compile_source_to_ir, CompilerConfig};
//!
//! let ir = compile_source_to_ir(
//!     "def f() -> int:\n    return 41 + 1\n",
//!     "example",
//!     &CompilerConfig::default(),
//! )?;
//! assert!(ir.contains("define i32 @f()"));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod typeops;
pub mod types;

pub use codegen::{CodeGen, CodeGenError};
pub use config::CompilerConfig;
pub use error::{CompilationError, ErrorKind};
pub use lexer::{recover_source, Lexer, LexerConfig, TokenStream};
pub use parser::Parser;
pub use token::{Token, TokenKind};
pub use types::PyType;

use std::fs;
use std::path::Path;

/// Compile a source string into textual LLVM IR.
///
/// All diagnostics accumulated during code generation are returned
/// together; lex and parse failures fail fast with a single entry.
pub fn compile_source_to_ir(
    source: &str,
    module_name: &str,
    config: &CompilerConfig,
) -> Result<String, Vec<CompilationError>> {
    let stream = Lexer::new(source, config.lexer.clone())
        .tokenize()
        .map_err(|e| vec![e])?;
    let module = Parser::new(stream, module_name)
        .parse_module()
        .map_err(|e| vec![e])?;
    let mut codegen = CodeGen::new();
    codegen.generate_module(&module)
}

/// Compile a source file to an IR file.
///
/// The output is written only on success; a failing compile leaves no
/// partial IR behind.
pub fn compile_file(
    input_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), String> {
    let source = fs::read_to_string(input_path)
        .map_err(|e| format!("Failed to read {}: {}", input_path.display(), e))?;

    let module_name = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();

    let ir = compile_source_to_ir(&source, &module_name, config).map_err(|errors| {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    })?;

    fs::write(output_path, ir)
        .map_err(|e| format!("Failed to write {}: {}", output_path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_end_to_end() {
        let ir = compile_source_to_ir(
            "def add(a: int, b: int) -> int:\n    return a + b\n",
            "adder",
            &CompilerConfig::default(),
        )
        .unwrap();
        assert!(ir.contains("; ModuleID = 'adder'"));
        assert!(ir.contains("define i32 @add(i32 %p0, i32 %p1)"));
        assert!(ir.contains("add i32"));
    }

    #[test]
    fn test_compile_reports_position() {
        let errs = compile_source_to_ir("x = $\n", "bad", &CompilerConfig::default()).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 1);
        assert!(errs[0].message.contains("invalid character"));
    }

    #[test]
    fn test_type_errors_accumulate_across_functions() {
        let errs = compile_source_to_ir(
            "def a() -> int:\n    return 1 + \"x\"\ndef b() -> int:\n    return 2.5 + \"y\"\n",
            "multi",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| e.is_type_error()));
    }

    #[test]
    fn test_compile_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("prog.py");
        let output = dir.path().join("prog.ll");
        std::fs::write(&input, "def f() -> int:\n    return 7\n").unwrap();

        compile_file(&input, &output, &CompilerConfig::default()).unwrap();
        let ir = std::fs::read_to_string(&output).unwrap();
        assert!(ir.contains("define i32 @f()"));
    }

    #[test]
    fn test_compile_file_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.py");
        let output = dir.path().join("bad.ll");
        std::fs::write(&input, "def f() -> int:\n    return 1 + \"x\"\n").unwrap();

        let err = compile_file(&input, &output, &CompilerConfig::default()).unwrap_err();
        assert!(err.contains("type error"));
        assert!(!output.exists());
    }

    #[test]
    fn test_while_loop_scenario_compiles() {
        // Scenario: find(xs, 7) == 7, find(xs, 42) == -1 once linked.
        let ir = compile_source_to_ir(
            concat!(
                "def find(xs: list[int], target: int) -> int:\n",
                "    i = 0\n",
                "    while i < 10:\n",
                "        if xs[i] == target:\n",
                "            return i\n",
                "        i = i + 1\n",
                "    else:\n",
                "        return -1\n",
            ),
            "find",
            &CompilerConfig::default(),
        )
        .unwrap();
        assert!(ir.contains("define i32 @find(ptr %p0, i32 %p1)"));
        // The callee releases its reference parameter on every return path.
        assert!(ir.contains("call void @py_decref(ptr %p0)"));
    }
}
