use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tarn_lexer::{tokenize, Builtins, Interner, Name};
use tarn_typeck::{CheckResult, CompileError};
use tarn_wasm::WasmError;

#[derive(Parser)]
#[command(name = "tarn", about = "The tarn programming language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a .tarn file and dump the untyped tree
    Parse {
        /// Path to the .tarn source file
        file: PathBuf,
    },
    /// Type-check a .tarn file
    Check {
        /// Path to the .tarn source file
        file: PathBuf,
        /// Name exported to the host; repeatable (default: `start`)
        #[arg(long = "export")]
        exports: Vec<String>,
    },
    /// Compile a .tarn file to a WebAssembly binary
    Build {
        /// Path to the .tarn source file
        file: PathBuf,
        /// Output path (default: the source path with `.wasm`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Name exported to the host; repeatable (default: `start`)
        #[arg(long = "export")]
        exports: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Parse { file } => {
            let source = load(&file)?;
            let (tokens, mut interner) = tokenize(&source);
            let builtins = Builtins::new(&mut interner);
            let (module, errors) = tarn_parser::parse(&tokens, &builtins);
            if !errors.is_empty() {
                return Err(errors
                    .iter()
                    .map(|e| format!("error: {} at {}", e.message, e.span.begin))
                    .collect::<Vec<_>>()
                    .join("\n"));
            }
            println!("{module:#?}");
            Ok(())
        }
        Command::Check { file, exports } => {
            let source = load(&file)?;
            let checked = frontend(&source, &exports)?;
            println!("OK");
            for &name in &checked.result.exports {
                if let Some(sig) = checked.result.fn_types.get(&name) {
                    let params = sig
                        .params
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("{}: fn({}) {}", checked.interner.lookup(name), params, sig.ret);
                }
            }
            Ok(())
        }
        Command::Build {
            file,
            output,
            exports,
        } => {
            let source = load(&file)?;
            let checked = frontend(&source, &exports)?;
            let bytes = tarn_wasm::compile(&checked.module, &checked.result, &checked.interner)
                .map_err(|e| render_wasm_error(&e))?;
            let out = output.unwrap_or_else(|| file.with_extension("wasm"));
            fs::write(&out, bytes)
                .map_err(|e| format!("error: cannot write {}: {}", out.display(), e))?;
            println!("wrote {}", out.display());
            Ok(())
        }
    }
}

struct Checked {
    module: tarn_ast::Module,
    interner: Interner,
    result: CheckResult,
}

fn load(file: &Path) -> Result<String, String> {
    fs::read_to_string(file).map_err(|e| format!("error: cannot read {}: {}", file.display(), e))
}

/// Tokenize, parse and type-check a source, rendering any errors.
fn frontend(source: &str, exports: &[String]) -> Result<Checked, String> {
    let (tokens, mut interner) = tokenize(source);
    let builtins = Builtins::new(&mut interner);
    let (mut module, parse_errors) = tarn_parser::parse(&tokens, &builtins);
    if !parse_errors.is_empty() {
        return Err(parse_errors
            .iter()
            .map(|e| format!("error: {} at {}", e.message, e.span.begin))
            .collect::<Vec<_>>()
            .join("\n"));
    }

    let export_names: Vec<Name> = exports.iter().map(|e| interner.store(e)).collect();
    let result = tarn_typeck::check(&mut module, &interner, &builtins, &export_names);
    if !result.errors.is_empty() {
        return Err(result
            .errors
            .iter()
            .map(render_error)
            .collect::<Vec<_>>()
            .join("\n"));
    }

    Ok(Checked {
        module,
        interner,
        result,
    })
}

fn render_error(error: &CompileError) -> String {
    match error.span() {
        Some(span) => format!("error: {} at {}", error, span.begin),
        None => format!("error: {}", error),
    }
}

fn render_wasm_error(error: &WasmError) -> String {
    match error.span() {
        Some(span) => format!("error: {} at {}", error, span.begin),
        None => format!("error: {}", error),
    }
}
