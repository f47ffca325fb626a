//! Compiler configuration.
//!
//! Options come from three layers: built-in defaults, an optional TOML
//! configuration file, and CLI flags (applied last by the binary). The TOML
//! surface mirrors the lexer options plus output behaviour:
//!
//! ```toml
//! [lexer]
//! tab-width = 4
//! allow-tab-indent = false
//! strict-indentation = true
//!
//! [output]
//! dump-tokens = false
//! ```

use crate::lexer::LexerConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Full compiler configuration.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    pub lexer: LexerConfig,
    /// Dump the token stream to stderr before parsing
    pub dump_tokens: bool,
    /// Write the source-recovery rendering of the token stream here
    pub recover_source_path: Option<PathBuf>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from a TOML string, on top of the defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        let file: ConfigFile = toml::from_str(toml_str)
            .map_err(|e| format!("Failed to parse compiler config: {}", e))?;
        let mut config = CompilerConfig::default();
        config.apply(file);
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(lexer) = file.lexer {
            if let Some(v) = lexer.tab_width {
                self.lexer.tab_width = v;
            }
            if let Some(v) = lexer.allow_tab_indent {
                self.lexer.allow_tab_indent = v;
            }
            if let Some(v) = lexer.strict_indentation {
                self.lexer.strict_indentation = v;
            }
            if let Some(v) = lexer.ignore_comments {
                self.lexer.ignore_comments = v;
            }
            if let Some(v) = lexer.support_type_annotations {
                self.lexer.support_type_annotations = v;
            }
        }
        if let Some(output) = file.output {
            if let Some(v) = output.dump_tokens {
                self.dump_tokens = v;
            }
            if let Some(v) = output.recover_source {
                self.recover_source_path = Some(v);
            }
        }
    }

    pub fn with_tab_width(mut self, width: usize) -> Self {
        self.lexer.tab_width = width;
        self
    }

    pub fn with_dump_tokens(mut self, dump: bool) -> Self {
        self.dump_tokens = dump;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    lexer: Option<LexerSection>,
    output: Option<OutputSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LexerSection {
    tab_width: Option<usize>,
    allow_tab_indent: Option<bool>,
    strict_indentation: Option<bool>,
    ignore_comments: Option<bool>,
    support_type_annotations: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct OutputSection {
    dump_tokens: Option<bool>,
    recover_source: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.lexer.tab_width, 4);
        assert!(!config.lexer.allow_tab_indent);
        assert!(config.lexer.strict_indentation);
        assert!(!config.dump_tokens);
    }

    #[test]
    fn test_from_toml_overrides() {
        let config = CompilerConfig::from_toml(
            r#"
            [lexer]
            tab-width = 8
            allow-tab-indent = true

            [output]
            dump-tokens = true
            "#,
        )
        .unwrap();
        assert_eq!(config.lexer.tab_width, 8);
        assert!(config.lexer.allow_tab_indent);
        // Untouched fields keep their defaults.
        assert!(config.lexer.strict_indentation);
        assert!(config.dump_tokens);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(CompilerConfig::from_toml("[lexer\ntab-width = ").is_err());
    }
}
