//! Results of one sync tick.

use crate::{ChangeVersion, PartitionId};
use catalog_sync_shared::ErrorEnvelope;
use serde::{Deserialize, Serialize};

/// Why a tick stopped before visiting any partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The change feed could not be queried.
    FeedUnavailable,
    /// The feed exists but holds no changes yet (current version 0).
    EmptyFeed,
    /// Partitions could not be enumerated.
    PartitionsUnavailable {
        /// Underlying failure.
        error: ErrorEnvelope,
    },
}

impl AbortReason {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FeedUnavailable => "feed_unavailable",
            Self::EmptyFeed => "empty_feed",
            Self::PartitionsUnavailable { .. } => "partitions_unavailable",
        }
    }
}

/// Tick-level outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Preconditions failed; no partition state was touched.
    Aborted {
        /// Why the tick aborted.
        reason: AbortReason,
    },
    /// Every partition was visited.
    Completed {
        /// Feed version observed at tick start.
        current_version: ChangeVersion,
    },
}

/// Where a partition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Loading or creating the watermark.
    WatermarkInit,
    /// Querying the changed entity ids.
    FeedQuery,
    /// Persisting the advanced watermark.
    WatermarkAdvance,
}

impl FailureStage {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WatermarkInit => "watermark_init",
            Self::FeedQuery => "feed_query",
            Self::WatermarkAdvance => "watermark_advance",
        }
    }
}

/// What happened to one partition during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartitionOutcome {
    /// Sync is turned off for this partition; its watermark was not touched.
    Disabled,
    /// First sync: watermark created at the current version, nothing notified.
    Initialized {
        /// Version the watermark was created at.
        version: ChangeVersion,
    },
    /// Nothing newer than the watermark.
    UpToDate {
        /// Current watermark.
        version: ChangeVersion,
    },
    /// Watermark moved forward.
    Advanced {
        /// Previous watermark.
        from: ChangeVersion,
        /// New watermark.
        to: ChangeVersion,
        /// Distinct entities delivered (0 when the window held only no-op rows).
        notified: usize,
    },
    /// Notifier did not confirm; watermark held for the next tick.
    NotifyPending {
        /// Watermark that was kept.
        held_at: ChangeVersion,
        /// Version the tick tried to reach.
        target: ChangeVersion,
        /// Distinct entities in the undelivered batch.
        entities: usize,
    },
    /// A collaborator failed; watermark left as it was.
    Failed {
        /// Where the failure happened.
        stage: FailureStage,
        /// Underlying failure.
        error: ErrorEnvelope,
    },
}

impl PartitionOutcome {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Initialized { .. } => "initialized",
            Self::UpToDate { .. } => "up_to_date",
            Self::Advanced { .. } => "advanced",
            Self::NotifyPending { .. } => "notify_pending",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Per-partition entry in a tick report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionReport {
    /// Partition visited.
    pub partition_id: PartitionId,
    /// What happened.
    pub outcome: PartitionOutcome,
}

/// Full result of one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTickReport {
    /// Correlation id of the tick.
    pub correlation_id: Box<str>,
    /// Tick-level outcome.
    pub outcome: TickOutcome,
    /// One entry per enumerated partition, in enumeration order.
    pub partitions: Vec<PartitionReport>,
}

impl SyncTickReport {
    /// Report for a tick that stopped at its preconditions.
    #[must_use]
    pub fn aborted(correlation_id: impl Into<Box<str>>, reason: AbortReason) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: TickOutcome::Aborted { reason },
            partitions: Vec::new(),
        }
    }

    /// True when the tick aborted before visiting partitions.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self.outcome, TickOutcome::Aborted { .. })
    }

    /// Outcome for `partition`, if it was visited.
    #[must_use]
    pub fn outcome_for(&self, partition: &PartitionId) -> Option<&PartitionOutcome> {
        self.partitions
            .iter()
            .find(|report| &report.partition_id == partition)
            .map(|report| &report.outcome)
    }

    /// Number of partitions whose outcome has `label`.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.partitions
            .iter()
            .filter(|report| report.outcome.label() == label)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_shared::ErrorCode;

    #[test]
    fn outcomes_serialize_with_status_tag() -> Result<(), Box<dyn std::error::Error>> {
        let outcome = PartitionOutcome::Advanced {
            from: ChangeVersion::new(10),
            to: ChangeVersion::new(15),
            notified: 2,
        };
        let value = serde_json::to_value(&outcome)?;
        assert_eq!(value["status"], "advanced");
        assert_eq!(value["from"], 10);
        assert_eq!(value["to"], 15);
        Ok(())
    }

    #[test]
    fn aborted_report_has_no_partitions() -> Result<(), Box<dyn std::error::Error>> {
        let report = SyncTickReport::aborted("tick_1", AbortReason::EmptyFeed);
        assert!(report.is_aborted());
        assert!(report.partitions.is_empty());

        let value = serde_json::to_value(&report)?;
        assert_eq!(value["outcome"]["status"], "aborted");
        assert_eq!(value["outcome"]["reason"]["kind"], "empty_feed");
        Ok(())
    }

    #[test]
    fn report_counts_by_label() -> Result<(), Box<dyn std::error::Error>> {
        let report = SyncTickReport {
            correlation_id: "tick_2".into(),
            outcome: TickOutcome::Completed {
                current_version: ChangeVersion::new(5),
            },
            partitions: vec![
                PartitionReport {
                    partition_id: PartitionId::parse("1")?,
                    outcome: PartitionOutcome::Disabled,
                },
                PartitionReport {
                    partition_id: PartitionId::parse("2")?,
                    outcome: PartitionOutcome::Failed {
                        stage: FailureStage::FeedQuery,
                        error: ErrorEnvelope::expected(
                            ErrorCode::io(),
                            "boom",
                        ),
                    },
                },
            ],
        };
        assert_eq!(report.count("disabled"), 1);
        assert_eq!(report.count("failed"), 1);
        assert_eq!(report.count("advanced"), 0);
        assert_eq!(
            report.outcome_for(&PartitionId::parse("1")?),
            Some(&PartitionOutcome::Disabled)
        );
        Ok(())
    }
}
