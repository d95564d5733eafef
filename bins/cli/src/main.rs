//! CLI binary entrypoint.

mod commands;
mod error;
mod format;

use catalog_sync_config::{LogFormat, ValidatedSyncConfig};
use catalog_sync_infra::{
    ConfigFormat, InfraError, Observability, is_secret_key, load_effective_config,
};
use catalog_sync_shared::REDACTED;
use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::{
    run_config_check, run_config_show, run_daemon_command, run_info, run_once, run_status,
};
use error::{CliError, ExitCode};
use format::{OutputArgs, OutputMode};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const ENV_PREFIX: &str = "CSY_";

#[derive(Debug, Parser)]
#[command(
    name = "csync",
    version,
    about = "Changelog-driven catalog sync",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Config file path (JSON/TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JSON overrides (partial config) applied on top of file and env.
    #[arg(long, global = true)]
    overrides_json: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync tick and exit.
    Run,
    /// Run sync ticks on the configured interval until interrupted.
    Daemon {
        /// Stop after this many scheduled ticks.
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Show watermarks and lag per partition.
    Status,
    /// Config-related commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Show build and version details.
    Info,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Validate config loading, merging, and normalization.
    Check,
    /// Show the effective config after applying env and overrides.
    Show {
        /// Rendering of the effective config.
        #[arg(long, value_enum, default_value_t = ShowFormat::Json)]
        format: ShowFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ShowFormat {
    Json,
    Toml,
}

impl From<ShowFormat> for ConfigFormat {
    fn from(value: ShowFormat) -> Self {
        match value {
            ShowFormat::Json => Self::Json,
            ShowFormat::Toml => Self::Toml,
        }
    }
}

/// Where the effective config comes from.
pub(crate) struct ConfigSource<'a> {
    pub path: Option<&'a Path>,
    pub overrides_json: Option<&'a str>,
}

impl ConfigSource<'_> {
    pub(crate) fn display_path(&self) -> Option<String> {
        self.path.map(|path| path.to_string_lossy().to_string())
    }
}

pub(crate) struct CliOutput {
    stdout: String,
    stderr: String,
    exit_code: ExitCode,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mode = OutputMode::from_args(&cli.output);
    let source = ConfigSource {
        path: cli.config.config.as_deref(),
        overrides_json: cli.config.overrides_json.as_deref(),
    };
    let env = collect_scoped_env(ENV_PREFIX);

    match run(&cli.command, mode, &env, &source) {
        Ok(output) => match write_output(&output) {
            Ok(()) => std::process::ExitCode::from(output.exit_code.as_u8()),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    std::process::ExitCode::from(error.exit_code().as_u8())
}

fn run(
    command: &Commands,
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &ConfigSource<'_>,
) -> Result<CliOutput, CliError> {
    match command {
        Commands::Info => run_info(mode),
        Commands::Config { command } => match command {
            ConfigCommands::Check => run_config_check(mode, env, source),
            ConfigCommands::Show { format } => {
                run_config_show(mode, env, source, (*format).into())
            },
        },
        Commands::Run | Commands::Daemon { .. } | Commands::Status => {
            let config = match load_effective_config(env, source.path, source.overrides_json) {
                Ok(config) => config,
                Err(error) => {
                    return Ok(format_error_output(mode, &error, ExitCode::for_envelope(&error)));
                },
            };
            run_with_config(command, mode, &config)
        },
    }
}

fn run_with_config(
    command: &Commands,
    mode: OutputMode,
    config: &ValidatedSyncConfig,
) -> Result<CliOutput, CliError> {
    if matches!(command, Commands::Status) {
        return run_status(mode, config);
    }

    init_tracing(config);
    let observability = match Observability::from_config(config) {
        Ok(observability) => observability,
        Err(error) => {
            return Ok(format_error_output(mode, &error, ExitCode::for_envelope(&error)));
        },
    };
    match command {
        Commands::Daemon { max_ticks } => {
            run_daemon_command(mode, config, &observability, *max_ticks)
        },
        _ => run_once(mode, config, &observability),
    }
}

/// Install a `tracing` subscriber on stderr when `logging.format` asks for it.
fn init_tracing(config: &ValidatedSyncConfig) {
    if config.logging.format != LogFormat::Tracing {
        return;
    }
    let filter =
        EnvFilter::try_new(config.logging.level.as_ref()).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub(crate) fn format_error_output(
    mode: OutputMode,
    error: &InfraError,
    exit_code: ExitCode,
) -> CliOutput {
    let payload = error_payload(error);

    let mut stderr = String::new();
    log_info(&mut stderr, "command failed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        let line = serde_json::json!({
            "type": "error",
            "status": "error",
            "error": payload,
        });
        let mut out = serde_json::to_string(&line).unwrap_or_else(|_| {
            "{\"type\":\"error\",\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\"}}".to_string()
        });
        out.push('\n');
        out
    } else if mode.is_json() {
        let body = serde_json::json!({
            "status": "error",
            "error": payload,
        });

        // This is a CLI boundary, so JSON serialization errors are internal.
        let mut output = serde_json::to_string_pretty(&body).unwrap_or_else(|_| {
            "{\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\"}}".to_string()
        });
        output.push('\n');
        output
    } else {
        format_error_text(error)
    };

    CliOutput {
        stdout,
        stderr,
        exit_code,
    }
}

fn redacted_metadata(error: &InfraError) -> BTreeMap<&str, &str> {
    error
        .metadata
        .iter()
        .map(|(key, value)| {
            let value = if is_secret_key(key) {
                REDACTED
            } else {
                value.as_str()
            };
            (key.as_str(), value)
        })
        .collect()
}

fn error_payload(error: &InfraError) -> serde_json::Value {
    let meta = redacted_metadata(error);
    let meta = (!meta.is_empty()).then_some(meta);
    serde_json::json!({
        "code": error.code.to_string(),
        "message": error.message,
        "kind": error.kind.to_string(),
        "retriable": error.class.is_retriable(),
        "meta": meta,
    })
}

fn format_error_text(error: &InfraError) -> String {
    let mut out = String::new();
    out.push_str("status: error\n");
    out.push_str("code: ");
    out.push_str(&error.code.to_string());
    out.push('\n');
    out.push_str("message: ");
    out.push_str(&error.message);
    out.push('\n');
    out.push_str("kind: ");
    out.push_str(&error.kind.to_string());
    out.push('\n');

    let meta = redacted_metadata(error);
    if !meta.is_empty() {
        out.push_str("meta:\n");
        for (key, value) in meta {
            out.push_str("  ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
    }

    out
}

pub(crate) fn log_info(stderr: &mut String, message: &str, no_progress: bool) {
    if no_progress {
        return;
    }
    stderr.push_str("info: ");
    stderr.push_str(message);
    stderr.push('\n');
}

pub(crate) fn format_ndjson_summary(
    status: &str,
    kind: &str,
    extra: Option<serde_json::Value>,
) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert("type".to_string(), "summary".into());
    payload.insert("status".to_string(), status.into());
    payload.insert("kind".to_string(), kind.into());
    if let Some(serde_json::Value::Object(map)) = extra {
        payload.extend(map);
    }
    let mut out = serde_json::to_string(&serde_json::Value::Object(payload)).unwrap_or_else(|_| {
        "{\"type\":\"summary\",\"status\":\"error\",\"kind\":\"internal\"}".to_string()
    });
    out.push('\n');
    out
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;

    if !output.stderr.is_empty() {
        let mut stderr = io::stderr();
        stderr.write_all(output.stderr.as_bytes())?;
        stderr.flush()?;
    }

    Ok(())
}

fn collect_scoped_env(prefix: &str) -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(prefix))
        .collect()
}
