//! Rill compiler CLI
//!
//! Flat command-line interface: positional inputs, `-o/--output`, `-O`
//! levels, `-f` feature options and `-W` warning options, plus shell
//! completion generation. The exit code is non-zero iff at least one error
//! or fatal diagnostic was emitted.

use std::io;
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use rillc::config::OptionError;
use rillc::{DiagEngine, DiagKind, Options, ProjectConfig, check_file};

#[derive(ClapParser)]
#[command(name = "rillc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rill compiler - check and compile .rl programs", long_about = None)]
struct Cli {
    /// Input source files
    inputs: Vec<PathBuf>,

    /// Output path (recorded for the backend)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optimization level: 0, 1, 2, 3, s or z
    #[arg(short = 'O', value_name = "LEVEL", default_value = "0")]
    opt_level: String,

    /// Feature options: NAME, no-NAME or NAME=INT (e.g. -f max-errors=4)
    #[arg(short = 'f', value_name = "FEATURE")]
    features: Vec<String>,

    /// Warning options: error, fatal-errors, no-warnings, no-notes
    #[arg(short = 'W', value_name = "WARNING")]
    warnings: Vec<String>,

    /// Stop after semantic analysis
    #[arg(long)]
    syntax_only: bool,

    /// Path to a rillc.toml project config
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Generate shell completion scripts and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

/// Builds the final option set from config file and flags; command-line
/// flags are applied last and win. Option errors are reported through the
/// diagnostic engine like any other error.
fn build_options(cli: &Cli, engine: &DiagEngine) -> Option<Options> {
    let mut options = Options::new();

    if let Some(config_path) = &cli.config {
        let text = match std::fs::read_to_string(config_path) {
            Ok(text) => text,
            Err(_) => {
                engine
                    .diag(DiagKind::ErrFailOpenFile)
                    .arg_str(&config_path.display().to_string())
                    .flush();
                return None;
            }
        };
        match ProjectConfig::from_toml(&text) {
            Ok(config) => config.apply_to(&mut options),
            Err(message) => {
                eprintln!("rillc: {message}");
                return None;
            }
        }
    }

    let mut ok = true;
    for feature in &cli.features {
        if let Err(error) = options.apply_feature(feature) {
            report_option_error(engine, &error);
            ok = false;
        }
    }
    for warning in &cli.warnings {
        if let Err(error) = options.apply_warning_option(warning) {
            report_option_error(engine, &error);
            ok = false;
        }
    }

    match rillc::OptimizationLevel::parse(&cli.opt_level) {
        Some(level) => options.opt_level = level,
        None => {
            engine
                .diag(DiagKind::ErrUnknownCmdlineOpt)
                .arg_str(&format!("-O{}", cli.opt_level))
                .flush();
            ok = false;
        }
    }

    options.syntax_only = options.syntax_only || cli.syntax_only;
    options.output = cli.output.clone();
    options.inputs = cli.inputs.clone();

    if ok { Some(options) } else { None }
}

fn report_option_error(engine: &DiagEngine, error: &OptionError) {
    match error {
        OptionError::Unknown(option) => {
            engine
                .diag(DiagKind::ErrUnknownCmdlineOpt)
                .arg_str(option)
                .flush();
        }
        OptionError::ExpectsInt(option) => {
            engine
                .diag(DiagKind::ErrCmdlineOptExpectInt)
                .arg_str(option)
                .flush();
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("RILLC_LOG"))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        generate(shell, &mut command, name, &mut io::stdout());
        return;
    }

    // A bare engine for driver-level diagnostics; per-file engines are
    // created by the pipeline with the final options.
    let boot_engine = DiagEngine::new(rillc::DiagOptions::default());

    let Some(options) = build_options(&cli, &boot_engine) else {
        process::exit(1);
    };

    if options.inputs.is_empty() {
        boot_engine.diag(DiagKind::ErrNoInputFiles).flush();
        process::exit(1);
    }

    let mut has_errors = false;
    for input in &options.inputs {
        match check_file(input, &options) {
            Ok(outcome) => has_errors |= outcome.has_errors(),
            Err(_) => {
                boot_engine
                    .diag(DiagKind::ErrFailOpenFile)
                    .arg_str(&input.display().to_string())
                    .flush();
                has_errors = true;
            }
        }
    }

    process::exit(if has_errors { 1 } else { 0 });
}
