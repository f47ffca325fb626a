//! Pylite compiler CLI.
//!
//! `pylitec compile <input.py> [output.ll]` emits textual LLVM IR; linking
//! against the C runtime is left to an external toolchain. `check` stops
//! after parsing and type checking, `tokens` dumps the lexer output, and
//! `completions` generates shell completion scripts.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use pylitec::{token, CompilationError, CompilerConfig, Lexer};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "pylitec")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pylite compiler - compile a Python subset to LLVM IR", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .py file to LLVM IR
    Compile {
        /// Input source file
        input: PathBuf,

        /// Output .ll path (defaults to output.ll)
        output: Option<PathBuf>,

        /// Path to a compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dump the token stream to stderr before parsing
        #[arg(long)]
        dump_tokens: bool,

        /// Write a source-recovery rendering of the token stream
        #[arg(long, value_name = "PATH")]
        recover_source: Option<PathBuf>,

        /// Columns per tab for indent calculation
        #[arg(long, value_name = "N")]
        tab_width: Option<usize>,
    },

    /// Parse and type check without writing IR
    Check {
        /// Input source file
        input: PathBuf,

        /// Path to a compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Dump the token stream of a source file
    Tokens {
        /// Input source file
        input: PathBuf,

        /// Also write a source-recovery rendering here
        #[arg(long, value_name = "PATH")]
        recover: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            input,
            output,
            config,
            dump_tokens,
            recover_source,
            tab_width,
        } => {
            let output = output.unwrap_or_else(|| PathBuf::from("output.ll"));
            let mut cfg = load_config(config.as_deref());
            cfg.dump_tokens = cfg.dump_tokens || dump_tokens;
            if let Some(path) = recover_source {
                cfg.recover_source_path = Some(path);
            }
            if let Some(width) = tab_width {
                cfg.lexer.tab_width = width;
            }
            run_compile(&input, &output, &cfg);
        }
        Commands::Check { input, config } => {
            let cfg = load_config(config.as_deref());
            run_check(&input, &cfg);
        }
        Commands::Tokens { input, recover } => {
            run_tokens(&input, recover.as_deref());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "pylitec", &mut io::stdout());
        }
    }
}

fn load_config(path: Option<&Path>) -> CompilerConfig {
    match path {
        Some(path) => {
            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error reading config {}: {}", path.display(), e);
                    process::exit(1);
                }
            };
            match CompilerConfig::from_toml(&content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
        }
        None => CompilerConfig::default(),
    }
}

fn read_source(input: &Path) -> String {
    match std::fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    }
}

fn module_name(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string()
}

fn run_compile(input: &Path, output: &Path, config: &CompilerConfig) {
    let source = read_source(input);

    if config.dump_tokens || config.recover_source_path.is_some() {
        run_debug_aids(&source, config);
    }

    match pylitec::compile_source_to_ir(&source, &module_name(input), config) {
        Ok(ir) => {
            if let Err(e) = std::fs::write(output, ir) {
                eprintln!("Error writing {}: {}", output.display(), e);
                process::exit(1);
            }
            println!("Compiled {} -> {}", input.display(), output.display());
        }
        Err(errors) => {
            report_errors(&errors);
            process::exit(1);
        }
    }
}

fn run_check(input: &Path, config: &CompilerConfig) {
    let source = read_source(input);
    match pylitec::compile_source_to_ir(&source, &module_name(input), config) {
        Ok(_) => println!("{}: OK", input.display()),
        Err(errors) => {
            report_errors(&errors);
            process::exit(1);
        }
    }
}

fn run_tokens(input: &Path, recover: Option<&Path>) {
    let source = read_source(input);
    let config = CompilerConfig::default();
    let stream = match Lexer::new(&source, config.lexer.clone()).tokenize() {
        Ok(stream) => stream,
        Err(e) => {
            report_errors(&[e]);
            process::exit(1);
        }
    };

    for tok in stream.all_tokens() {
        eprintln!(
            "{:>4}:{:<3} {:<18} {:?}",
            tok.line,
            tok.column,
            token::token_name(tok.kind),
            tok.text
        );
    }

    if let Some(path) = recover {
        let recovered = pylitec::recover_source(stream.all_tokens());
        if let Err(e) = std::fs::write(path, recovered) {
            eprintln!("Error writing {}: {}", path.display(), e);
            process::exit(1);
        }
        println!("Recovered source written to {}", path.display());
    }
}

/// Token dump and source recovery for `compile --dump-tokens` /
/// `--recover-source`. Lex failures are left for the main pipeline to
/// report.
fn run_debug_aids(source: &str, config: &CompilerConfig) {
    let Ok(stream) = Lexer::new(source, config.lexer.clone()).tokenize() else {
        return;
    };
    if config.dump_tokens {
        for tok in stream.all_tokens() {
            eprintln!(
                "{:>4}:{:<3} {:<18} {:?}",
                tok.line,
                tok.column,
                token::token_name(tok.kind),
                tok.text
            );
        }
    }
    if let Some(path) = &config.recover_source_path {
        let recovered = pylitec::recover_source(stream.all_tokens());
        if let Err(e) = std::fs::write(path, recovered) {
            eprintln!("Warning: could not write {}: {}", path.display(), e);
        }
    }
}

fn report_errors(errors: &[CompilationError]) {
    let colored = io::stderr().is_terminal();
    for error in errors {
        if colored {
            eprintln!("{}", error.format_colored());
        } else {
            eprintln!("{}", error);
        }
    }
}
