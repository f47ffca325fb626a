//! Code generation error types.

use crate::ast::Loc;
use crate::error::{CompilationError, ErrorKind};

/// Error type for code generation operations.
///
/// Allows `?` propagation for both logical errors (bad programs, unknown
/// variables, type mismatches) and formatting errors from writing IR text.
#[derive(Debug)]
pub enum CodeGenError {
    /// A semantic type error (flagged separately for tooling)
    Type { loc: Loc, message: String },
    /// Any other logical error during emission
    Logic { loc: Loc, message: String },
    /// A formatting error when writing IR
    Format(std::fmt::Error),
}

impl CodeGenError {
    pub fn logic(loc: Loc, message: impl Into<String>) -> Self {
        CodeGenError::Logic {
            loc,
            message: message.into(),
        }
    }

    pub fn type_error(loc: Loc, message: impl Into<String>) -> Self {
        CodeGenError::Type {
            loc,
            message: message.into(),
        }
    }

    /// Convert into the pipeline-level error type.
    pub fn into_compilation_error(self) -> CompilationError {
        match self {
            CodeGenError::Type { loc, message } => {
                CompilationError::new(ErrorKind::Type, loc.line, loc.column, message)
            }
            CodeGenError::Logic { loc, message } => {
                CompilationError::new(ErrorKind::CodeGen, loc.line, loc.column, message)
            }
            CodeGenError::Format(e) => CompilationError::new(
                ErrorKind::CodeGen,
                0,
                0,
                format!("IR generation error: {}", e),
            ),
        }
    }
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Type { message, .. } => write!(f, "{}", message),
            CodeGenError::Logic { message, .. } => write!(f, "{}", message),
            CodeGenError::Format(e) => write!(f, "IR generation error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}
