//! steps — command-line front end for the workflow-steps compiler.
//!
//! Deliberately thin: it owns no lowering logic of its own, it only reads a
//! JSON-encoded surface AST, calls `workflow_steps_compiler::compile`, and
//! writes the resulting step-graph program back out as YAML.

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use workflow_steps_compiler::compiler::serialize::{Serializer, YamlSerializer};
use workflow_steps_compiler::{compile, format_error, CompileOptions};

fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn gray(s: &str) -> String {
    format!("\x1b[90m{s}\x1b[0m")
}

#[derive(Parser)]
#[command(
    name = "steps",
    version,
    about = "Lowers a JSON-encoded surface AST into a declarative step-graph workflow",
    help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}

Examples:
  steps compile program.ast.json              Compile a file to YAML on stdout
  steps compile program.ast.json -o out.yaml  Compile a file to YAML on disk
  cat program.ast.json | steps compile -      Compile an AST read from stdin
  steps check program.ast.json                Compile and report errors only
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a JSON AST file to a YAML step-graph program
    Compile {
        /// Path to the JSON AST file, or `-` for stdin
        file: PathBuf,
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compile a JSON AST file and report success or diagnostics, without
    /// emitting the program
    Check {
        /// Path to the JSON AST file, or `-` for stdin
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile { file, output } => run_compile(&file, output.as_deref()),
        Commands::Check { file } => run_check(&file),
    }
}

fn read_source(path: &PathBuf) -> io::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        fs::read_to_string(path)
    }
}

fn display_name(path: &PathBuf) -> String {
    if path.as_os_str() == "-" {
        "<stdin>".to_string()
    } else {
        path.display().to_string()
    }
}

fn run_compile(file: &PathBuf, output: Option<&std::path::Path>) -> ExitCode {
    let source = match read_source(file) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("{} failed to read {}: {err}", red("error:"), display_name(file));
            return ExitCode::FAILURE;
        }
    };

    let program: workflow_steps_compiler::compiler::ast::Program = match serde_json::from_str(&source) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("{} {}: invalid AST JSON: {err}", red("error:"), display_name(file));
            return ExitCode::FAILURE;
        }
    };

    let compiled = match compile(&program, &CompileOptions::default()) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("{}", format_error(&err, &source, &display_name(file)));
            return ExitCode::FAILURE;
        }
    };

    let yaml = YamlSerializer.serialize(&compiled);
    match output {
        Some(path) => {
            if let Err(err) = fs::write(path, yaml) {
                eprintln!("{} failed to write {}: {err}", red("error:"), path.display());
                return ExitCode::FAILURE;
            }
        }
        None => {
            if io::stdout().write_all(yaml.as_bytes()).is_err() {
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn run_check(file: &PathBuf) -> ExitCode {
    let source = match read_source(file) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("{} failed to read {}: {err}", red("error:"), display_name(file));
            return ExitCode::FAILURE;
        }
    };

    let program: workflow_steps_compiler::compiler::ast::Program = match serde_json::from_str(&source) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("{} {}: invalid AST JSON: {err}", red("error:"), display_name(file));
            return ExitCode::FAILURE;
        }
    };

    match compile(&program, &CompileOptions::default()) {
        Ok(compiled) => {
            println!(
                "{} {} ({} sub-workflow(s))",
                green("ok:"),
                display_name(file),
                compiled.sub_workflows.len()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", format_error(&err, &source, &display_name(file)));
            eprintln!("{}", gray(err.kind.to_string().as_str()));
            ExitCode::FAILURE
        }
    }
}
