//! # stolac
//!
//! The StolasScript compiler driver: reads a source file, runs the
//! pipeline, and writes a single `.s` assembly file. Exit code is 0 on
//! success and 1 on any failure (missing input, parse errors, semantic
//! errors, write failure).

mod cli;

use std::fs;
use std::process::ExitCode;

use log::error;

use stola_lang::codegen;
use stola_lang::loader;
use stola_lang::parser::Parser;
use stola_lang::semantic::SemanticAnalyzer;

use cli::Cli;

fn main() -> ExitCode {
    let args = Cli::init();

    simple_logger::init_with_level(args.verbosity.clone().into()).unwrap_or_default();

    let source = match fs::read_to_string(&args.input) {
        Ok(source) => source,
        Err(err) => {
            error!("Could not open file \"{}\": {err}", args.input.display());
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Compiling {}{}...",
        args.input.display(),
        if args.freestanding {
            " (Freestanding Mode)"
        } else {
            ""
        }
    );

    let mut parser = Parser::from_source(&source);
    let mut program = parser.parse_program();

    if !parser.errors.is_empty() {
        println!("Parser failed.");
        eprintln!("Parser errors:");
        for parse_error in &parser.errors {
            eprintln!("\t{parse_error}");
        }
        return ExitCode::FAILURE;
    }

    // The stdlib leans on the runtime, so imports only resolve in hosted
    // mode.
    if !args.freestanding {
        loader::resolve_imports(&mut program);
    }

    let mut analyzer = SemanticAnalyzer::new(args.freestanding);
    if !analyzer.analyze(&program) {
        println!("Semantic Analyzer failed.");
        eprintln!("Semantic errors:");
        for semantic_error in &analyzer.errors {
            eprintln!("\t{semantic_error}");
        }
        return ExitCode::FAILURE;
    }

    println!("Generating assembly to {}...", args.output.display());
    if !codegen::generate_to_file(&program, &args.output, args.freestanding) {
        return ExitCode::FAILURE;
    }

    println!("Compilation successful!");
    ExitCode::SUCCESS
}
