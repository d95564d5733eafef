//! Info command handler.

use crate::CliOutput;
use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use catalog_sync_infra::{crate_versions, postgres_enabled};
use serde_json::{Map, Value};

/// Run the info command.
pub fn run_info(mode: OutputMode) -> Result<CliOutput, CliError> {
    let versions = crate_versions();

    let stdout = if mode.is_ndjson() {
        let mut output = serde_json::to_string(&info_payload(&versions, true))?;
        output.push('\n');
        output
    } else if mode.is_json() {
        let mut output = serde_json::to_string_pretty(&info_payload(&versions, false))?;
        output.push('\n');
        output
    } else {
        format_info_text(&versions)
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

fn format_info_text(versions: &[(&str, &str)]) -> String {
    let mut out = format!(
        "status: ok\nname: {}\nversion: {}\npostgres: {}\n",
        env!("CARGO_BIN_NAME"),
        env!("CARGO_PKG_VERSION"),
        if postgres_enabled() { "enabled" } else { "disabled" },
    );
    for (layer, version) in versions {
        out.push_str(layer);
        out.push_str(": ");
        out.push_str(version);
        out.push('\n');
    }
    out
}

fn info_payload(versions: &[(&str, &str)], ndjson: bool) -> Value {
    let layers: Map<String, Value> = versions
        .iter()
        .map(|(layer, version)| ((*layer).to_string(), Value::from(*version)))
        .collect();
    let build = serde_json::json!({
        "name": env!("CARGO_BIN_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "postgres": postgres_enabled(),
        "layers": layers,
    });
    if ndjson {
        serde_json::json!({ "type": "summary", "status": "ok", "kind": "info", "build": build })
    } else {
        serde_json::json!({ "status": "ok", "build": build })
    }
}
