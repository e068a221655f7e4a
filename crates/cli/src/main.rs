mod commands;
mod logging;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use lineage_core::{load_config_str, ConfigError, ConfigFormat, SchemaConfig};

use crate::commands::{cmd_check, cmd_compile, cmd_history};
use crate::logging::{init_logging, LogConfig, LogFormat};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Lineage schema-evolution compiler.
#[derive(Parser)]
#[command(
    name = "lineage",
    version,
    about = "Lineage schema-evolution compiler"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema configuration to interchange JSON
    Compile {
        /// Path to the configuration (.json or .toml)
        config: PathBuf,
        /// Write the interchange JSON to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Worker threads for type graph construction (default: available cores)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Validate a schema configuration and print a summary
    Check {
        /// Path to the configuration (.json or .toml)
        config: PathBuf,
    },

    /// Show the distinct versions of one type and the upgrades between them
    History {
        /// Path to the configuration (.json or .toml)
        config: PathBuf,
        /// Type name, including wrapper spellings such as `-User` or `User[]`
        type_name: String,
    },
}

/// Failures that happen before the compiler gets to run.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}

/// Read and decode a configuration document, picking the format from the
/// file extension.
pub(crate) fn read_config(path: &Path) -> Result<SchemaConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&text, ConfigFormat::from_path(path)).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })
}

fn main() {
    let cli = Cli::parse();

    let log_format = match cli.output {
        OutputFormat::Json => LogFormat::Json,
        OutputFormat::Text if cli.verbose >= 3 => LogFormat::Pretty,
        OutputFormat::Text => LogFormat::Compact,
    };
    let log_config = LogConfig::from_verbosity(cli.verbose)
        .with_format(log_format)
        .with_target(cli.verbose >= 2)
        .with_ansi(io::stderr().is_terminal())
        .with_quiet(cli.quiet);
    init_logging(&log_config);

    match cli.command {
        Commands::Compile {
            config,
            out,
            workers,
        } => {
            cmd_compile(&config, out.as_deref(), workers, cli.output, cli.quiet);
        }
        Commands::Check { config } => {
            cmd_check(&config, cli.output, cli.quiet);
        }
        Commands::History { config, type_name } => {
            cmd_history(&config, &type_name, cli.output, cli.quiet);
        }
    }
}

/// Report an error that has no structured category (I/O, decoding).
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            let err = serde_json::json!({ "error": msg });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&err).unwrap_or_else(|_| msg.to_owned())
            );
        }
    }
}

/// Load the configuration or exit with status 1.
pub(crate) fn load_or_exit(path: &Path, output: OutputFormat, quiet: bool) -> SchemaConfig {
    match read_config(path) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    }
}

/// Print a compilation error in the requested format and exit with status 1.
pub(crate) fn exit_with_schema_error(
    err: &lineage_core::SchemaError,
    output: OutputFormat,
    quiet: bool,
) -> ! {
    match output {
        OutputFormat::Json => {
            let err_json = serde_json::to_string_pretty(&err.to_json_value())
                .unwrap_or_else(|_| format!("{{\"error\": \"{:?}\"}}", err));
            eprintln!("{}", err_json);
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("error[{}]: {}", err.category().as_str(), err);
            }
        }
    }
    process::exit(1);
}
