//! `status`: watermarks and lag per partition.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output};
use catalog_sync_app::SyncStatusReport;
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_infra::read_status;

/// Read watermarks and the feed head without writing anything.
pub fn run_status(mode: OutputMode, config: &ValidatedSyncConfig) -> Result<CliOutput, CliError> {
    let status = match read_status(config) {
        Ok(status) => status,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::for_envelope(&error))),
    };

    let stdout = if mode.is_ndjson() {
        format_status_ndjson(&status)?
    } else if mode.is_json() {
        let payload = serde_json::json!({ "status": "ok", "sync": status });
        let mut out = serde_json::to_string_pretty(&payload)?;
        out.push('\n');
        out
    } else {
        format_status_text(&status)
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

fn format_status_ndjson(status: &SyncStatusReport) -> Result<String, CliError> {
    let mut out = String::new();
    for partition in &status.partitions {
        let mut line = serde_json::to_value(partition)?;
        if let Some(map) = line.as_object_mut() {
            map.insert("type".to_string(), "partition".into());
        }
        out.push_str(&serde_json::to_string(&line)?);
        out.push('\n');
    }
    for watermark in &status.unconfigured {
        let mut line = serde_json::to_value(watermark)?;
        if let Some(map) = line.as_object_mut() {
            map.insert("type".to_string(), "unconfigured".into());
        }
        out.push_str(&serde_json::to_string(&line)?);
        out.push('\n');
    }
    let summary = serde_json::json!({
        "type": "summary",
        "status": "ok",
        "kind": "status",
        "feedAvailable": status.feed_available,
        "currentVersion": status.current_version,
    });
    out.push_str(&serde_json::to_string(&summary)?);
    out.push('\n');
    Ok(out)
}

fn format_status_text(status: &SyncStatusReport) -> String {
    let mut out = String::new();
    out.push_str("status: ok\nfeed: ");
    match status.current_version {
        Some(version) if status.feed_available => {
            out.push_str("available\ncurrentVersion: ");
            out.push_str(&version.to_string());
        },
        _ => out.push_str("unavailable"),
    }
    out.push('\n');

    for partition in &status.partitions {
        out.push_str("partition ");
        out.push_str(partition.partition_id.as_str());
        out.push_str(if partition.enabled { ": enabled" } else { ": disabled" });
        match &partition.watermark {
            Some(watermark) => {
                out.push_str(", watermark ");
                out.push_str(&watermark.last_version.to_string());
            },
            None => out.push_str(", not initialized"),
        }
        if let Some(lag) = partition.lag {
            out.push_str(", lag ");
            out.push_str(&lag.to_string());
        }
        out.push('\n');
    }

    for watermark in &status.unconfigured {
        out.push_str("unconfigured partition ");
        out.push_str(watermark.partition_id.as_str());
        out.push_str(": watermark ");
        out.push_str(&watermark.last_version.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_app::PartitionStatus;
    use catalog_sync_domain::{ChangeVersion, PartitionId, Watermark};
    use catalog_sync_shared::ErrorEnvelope;

    #[test]
    fn text_lists_lag_and_uninitialized_partitions() -> Result<(), ErrorEnvelope> {
        let one = PartitionId::parse("1")?;
        let status = SyncStatusReport {
            feed_available: true,
            current_version: Some(ChangeVersion::new(12)),
            partitions: vec![
                PartitionStatus {
                    partition_id: one.clone(),
                    enabled: true,
                    watermark: Some(Watermark {
                        partition_id: one,
                        last_version: ChangeVersion::new(10),
                        last_sync_at_ms: 1,
                    }),
                    lag: Some(2),
                },
                PartitionStatus {
                    partition_id: PartitionId::parse("2")?,
                    enabled: false,
                    watermark: None,
                    lag: None,
                },
            ],
            unconfigured: vec![Watermark {
                partition_id: PartitionId::parse("9")?,
                last_version: ChangeVersion::new(4),
                last_sync_at_ms: 1,
            }],
        };

        let text = format_status_text(&status);
        assert!(text.contains("currentVersion: 12"));
        assert!(text.contains("partition 1: enabled, watermark 10, lag 2"));
        assert!(text.contains("partition 2: disabled, not initialized"));
        assert!(text.contains("unconfigured partition 9: watermark 4"));
        Ok(())
    }

    #[test]
    fn unavailable_feed_is_reported() {
        let status = SyncStatusReport {
            feed_available: false,
            current_version: None,
            partitions: Vec::new(),
            unconfigured: Vec::new(),
        };
        assert!(format_status_text(&status).contains("feed: unavailable"));
    }
}
