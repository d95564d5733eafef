//! `config check` and `config show`.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, ConfigSource, format_error_output, format_ndjson_summary, log_info};
use catalog_sync_infra::{ConfigFormat, load_effective_config, render_config};
use std::collections::BTreeMap;

/// Validate config loading, merging and normalization.
pub fn run_config_check(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &ConfigSource<'_>,
) -> Result<CliOutput, CliError> {
    let rendered = load_effective_config(env, source.path, source.overrides_json)
        .and_then(|config| render_config(&config, ConfigFormat::Json));
    let config_json = match rendered {
        Ok(config_json) => config_json,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::for_envelope(&error))),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config check completed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_summary("ok", "config", None)
    } else if mode.is_json() {
        let config_value: serde_json::Value = serde_json::from_str(config_json.trim())?;
        let payload = serde_json::json!({
            "status": "ok",
            "configPath": source.display_path(),
            "effectiveConfig": config_value,
        });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        source.display_path().map_or_else(
            || "status: ok\nconfig: ok\n".to_string(),
            |path| format!("status: ok\nconfig: ok\npath: {path}\n"),
        )
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Print the effective config (secrets are never rendered).
pub fn run_config_show(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &ConfigSource<'_>,
    format: ConfigFormat,
) -> Result<CliOutput, CliError> {
    let rendered = load_effective_config(env, source.path, source.overrides_json)
        .and_then(|config| render_config(&config, format));
    let rendered = match rendered {
        Ok(rendered) => rendered,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::for_envelope(&error))),
    };

    let stdout = if mode.is_ndjson() || mode.is_json() {
        let effective = match format {
            ConfigFormat::Json => serde_json::from_str(rendered.trim())?,
            ConfigFormat::Toml => serde_json::Value::String(rendered),
        };
        let payload = serde_json::json!({
            "status": "ok",
            "configPath": source.display_path(),
            "effectiveConfig": effective,
        });
        let mut output = if mode.is_ndjson() {
            serde_json::to_string(&payload)?
        } else {
            serde_json::to_string_pretty(&payload)?
        };
        output.push('\n');
        output
    } else {
        let mut out = rendered;
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}
