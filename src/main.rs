//! # Warden CLI
//!
//! `warden check` parses and compiles policy files, reporting compile
//! errors with their source locations.
//!
//! ```bash
//! warden check policy.warden lib.warden
//! warden check --format json policy.warden
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use warden::{ast::Module, Compiler, Errors};

#[derive(Parser)]
#[command(name = "warden", version, about = "Warden policy language toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and compile policy files, reporting any errors.
    Check {
        /// Policy files to compile together.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output format for errors.
        #[arg(long, value_enum, default_value = "pretty")]
        format: Format,
        /// Keep print() calls instead of erasing them.
        #[arg(long)]
        print: bool,
        /// Abort after this many errors (0 = unlimited).
        #[arg(long, default_value_t = 0)]
        error_limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Check {
            files,
            format,
            print,
            error_limit,
        } => check(&files, format, print, error_limit),
    }
}

fn check(files: &[PathBuf], format: Format, print: bool, error_limit: usize) -> Result<ExitCode> {
    let mut modules: BTreeMap<String, Module> = BTreeMap::new();
    let mut parse_errors = Errors::new();

    for path in files {
        let name = path.display().to_string();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {name}"))?;
        match warden::parse_module(&name, &source) {
            Ok(module) => {
                modules.insert(name, module);
            }
            Err(errs) => parse_errors.extend(errs),
        }
    }

    if !parse_errors.is_empty() {
        report(&parse_errors, format)?;
        return Ok(ExitCode::FAILURE);
    }

    let mut compiler = Compiler::new().with_print_statements(print);
    compiler.set_error_limit(error_limit);
    compiler.compile(&modules);

    if compiler.failed() {
        report(&compiler.errors, format)?;
        return Ok(ExitCode::FAILURE);
    }

    tracing::info!(
        modules = modules.len(),
        rules = compiler.num_rules(),
        "check_ok"
    );
    println!("{} module(s), {} rule(s): ok", modules.len(), compiler.num_rules());
    Ok(ExitCode::SUCCESS)
}

fn report(errors: &Errors, format: Format) -> Result<()> {
    match format {
        Format::Pretty => {
            for err in errors {
                eprintln!("{err}");
            }
        }
        Format::Json => {
            let json = serde_json::to_string_pretty(errors)
                .context("failed to serialize errors")?;
            println!("{json}");
        }
    }
    Ok(())
}
