//! `daemon`: ticks on the configured interval until Ctrl-C.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ndjson_summary, log_info};
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_infra::{DaemonOptions, DaemonSummary, Observability, run_daemon};
use catalog_sync_shared::CancellationToken;

/// Run the scheduler loop and print lifetime totals when it stops.
pub fn run_daemon_command(
    mode: OutputMode,
    config: &ValidatedSyncConfig,
    observability: &Observability,
    max_ticks: Option<u64>,
) -> Result<CliOutput, CliError> {
    let options = DaemonOptions {
        max_ticks,
        handle_ctrl_c: true,
    };
    let summary = match run_daemon(config, observability, CancellationToken::new(), options) {
        Ok(summary) => summary,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::for_envelope(&error))),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "sync daemon stopped", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_summary("ok", "daemon", Some(serde_json::to_value(summary)?))
    } else if mode.is_json() {
        let payload = serde_json::json!({ "status": "ok", "daemon": summary });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        format_summary_text(&summary)
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

fn format_summary_text(summary: &DaemonSummary) -> String {
    format!(
        "status: ok\nticks: {}\nabortedTicks: {}\nskippedLocked: {}\npartitionsAdvanced: {}\npartitionsPending: {}\npartitionsFailed: {}\n",
        summary.ticks,
        summary.aborted_ticks,
        summary.skipped_locked,
        summary.partitions_advanced,
        summary.partitions_pending,
        summary.partitions_failed,
    )
}
