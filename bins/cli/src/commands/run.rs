//! `run`: a single sync tick.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, log_info};
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::{AbortReason, PartitionOutcome, SyncTickReport, TickOutcome};
use catalog_sync_infra::{Observability, run_sync_once};

/// Run one tick under the tick lock and print its report.
pub fn run_once(
    mode: OutputMode,
    config: &ValidatedSyncConfig,
    observability: &Observability,
) -> Result<CliOutput, CliError> {
    let report = match run_sync_once(config, observability) {
        Ok(report) => report,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::for_envelope(&error))),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "sync tick finished", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_report_ndjson(&report)?
    } else if mode.is_json() {
        let payload = serde_json::json!({ "status": "ok", "report": report });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        format_report_text(&report)
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: report_exit_code(&report),
    })
}

/// Failed partitions and unlistable partitions exit 1. An unavailable or
/// empty feed is a normal skipped tick.
pub(crate) fn report_exit_code(report: &SyncTickReport) -> ExitCode {
    let partitions_unavailable = matches!(
        report.outcome,
        TickOutcome::Aborted {
            reason: AbortReason::PartitionsUnavailable { .. }
        }
    );
    if partitions_unavailable || report.count("failed") > 0 {
        ExitCode::Failure
    } else {
        ExitCode::Ok
    }
}

fn format_report_ndjson(report: &SyncTickReport) -> Result<String, CliError> {
    let mut out = String::new();
    for entry in &report.partitions {
        let line = serde_json::json!({
            "type": "partition",
            "partitionId": entry.partition_id,
            "outcome": entry.outcome,
        });
        out.push_str(&serde_json::to_string(&line)?);
        out.push('\n');
    }
    let summary = serde_json::json!({
        "type": "summary",
        "status": "ok",
        "kind": "run",
        "correlationId": report.correlation_id,
        "outcome": report.outcome,
    });
    out.push_str(&serde_json::to_string(&summary)?);
    out.push('\n');
    Ok(out)
}

fn format_report_text(report: &SyncTickReport) -> String {
    let mut out = String::new();
    out.push_str("status: ok\n");
    out.push_str("correlationId: ");
    out.push_str(&report.correlation_id);
    out.push('\n');
    match &report.outcome {
        TickOutcome::Completed { current_version } => {
            out.push_str("tick: completed\ncurrentVersion: ");
            out.push_str(&current_version.to_string());
            out.push('\n');
        },
        TickOutcome::Aborted { reason } => {
            out.push_str("tick: aborted\nreason: ");
            out.push_str(reason.as_str());
            out.push('\n');
            if let AbortReason::PartitionsUnavailable { error } = reason {
                out.push_str("error: ");
                out.push_str(&error.to_string());
                out.push('\n');
            }
        },
    }
    for entry in &report.partitions {
        out.push_str("partition ");
        out.push_str(entry.partition_id.as_str());
        out.push_str(": ");
        out.push_str(&describe_outcome(&entry.outcome));
        out.push('\n');
    }
    out
}

fn describe_outcome(outcome: &PartitionOutcome) -> String {
    match outcome {
        PartitionOutcome::Disabled => "disabled".to_string(),
        PartitionOutcome::Initialized { version } => format!("initialized at {version}"),
        PartitionOutcome::UpToDate { version } => format!("up to date at {version}"),
        PartitionOutcome::Advanced { from, to, notified } => {
            format!("advanced {from} -> {to} ({notified} notified)")
        },
        PartitionOutcome::NotifyPending {
            held_at,
            target,
            entities,
        } => format!("notify pending, held at {held_at} (target {target}, {entities} entities)"),
        PartitionOutcome::Failed { stage, error } => {
            format!("failed at {} ({error})", stage.as_str())
        },
    }
}
