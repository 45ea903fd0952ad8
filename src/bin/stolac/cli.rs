//! CLI argument parsing for stolac.

use clap::{Parser, ValueEnum};

/// Ahead-of-time compiler for StolasScript. Emits GNU-assembler Intel
/// syntax for x86-64; link the output against the stola runtime, or pass
/// `--freestanding` to produce runtime-free assembly for bare-metal
/// targets.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// The StolasScript source file to compile.
    pub input: std::path::PathBuf,

    /// Path of the generated assembly file.
    pub output: std::path::PathBuf,

    /// Compile for bare-metal without runtime dependencies. Values become
    /// raw 64-bit integers and only a restricted language subset is legal.
    #[arg(long)]
    pub freestanding: bool,

    /// Log level of the compiler.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// Only critical errors.
    Error,

    /// Also warnings, like dynamic type relaxation.
    #[default]
    Warn,

    /// General progress of the compiler.
    Info,

    /// Everything that happens internally.
    Debug,
}

impl From<LogLevel> for log::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}
