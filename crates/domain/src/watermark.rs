//! Watermarks and change-feed windows.

use crate::{ChangeVersion, EntityId, PartitionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Last confirmed position in the change feed for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    /// Partition this watermark belongs to.
    pub partition_id: PartitionId,
    /// Highest version whose changes were delivered (or skipped at init).
    pub last_version: ChangeVersion,
    /// Wall clock of the last init/advance, epoch milliseconds.
    pub last_sync_at_ms: u64,
}

impl Watermark {
    /// The window of changes still to deliver up to `current`.
    #[must_use]
    pub const fn pending_window(&self, current: ChangeVersion) -> VersionWindow {
        VersionWindow::new(self.last_version, current)
    }

    /// True when `current` holds nothing newer than this watermark.
    #[must_use]
    pub fn is_caught_up(&self, current: ChangeVersion) -> bool {
        current <= self.last_version
    }

    /// Copy with `last_version` moved to `version`, stamped at `now_ms`.
    #[must_use]
    pub fn advanced_to(&self, version: ChangeVersion, now_ms: u64) -> Self {
        Self {
            partition_id: self.partition_id.clone(),
            last_version: version,
            last_sync_at_ms: now_ms,
        }
    }
}

/// Half-open version range `(after, up_to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionWindow {
    /// Exclusive lower bound.
    pub after: ChangeVersion,
    /// Inclusive upper bound.
    pub up_to: ChangeVersion,
}

impl VersionWindow {
    /// Build a window; `up_to <= after` yields an empty window.
    #[must_use]
    pub const fn new(after: ChangeVersion, up_to: ChangeVersion) -> Self {
        Self { after, up_to }
    }

    /// True when no version can fall inside the window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.up_to <= self.after
    }

    /// True when `version` falls inside the window.
    #[must_use]
    pub fn contains(&self, version: ChangeVersion) -> bool {
        self.after < version && version <= self.up_to
    }
}

/// One row of the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Changed entity.
    pub entity_id: EntityId,
    /// Version assigned by the feed.
    pub version: ChangeVersion,
}

/// Distinct, ascending set of changed entity ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangedEntities(BTreeSet<EntityId>);

impl ChangedEntities {
    /// Empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Collapse the records inside `window` to distinct entity ids.
    pub fn from_records<'a, I>(window: VersionWindow, records: I) -> Self
    where
        I: IntoIterator<Item = &'a ChangeRecord>,
    {
        records
            .into_iter()
            .filter(|record| window.contains(record.version))
            .map(|record| record.entity_id)
            .collect()
    }

    /// Number of distinct ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no entity changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `id` is present.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.0.contains(&id)
    }

    /// Ascending iterator over ids.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.0.iter().copied()
    }

    /// Raw ids, ascending.
    #[must_use]
    pub fn to_raw_ids(&self) -> Vec<u64> {
        self.iter().map(EntityId::get).collect()
    }
}

impl FromIterator<EntityId> for ChangedEntities {
    fn from_iter<T: IntoIterator<Item = EntityId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<EntityId> for ChangedEntities {
    fn extend<T: IntoIterator<Item = EntityId>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(value: u64) -> ChangeVersion {
        ChangeVersion::new(value)
    }

    fn record(entity: u64, version: u64) -> ChangeRecord {
        ChangeRecord {
            entity_id: EntityId::new(entity),
            version: v(version),
        }
    }

    #[test]
    fn window_bounds_are_exclusive_then_inclusive() {
        let window = VersionWindow::new(v(10), v(15));
        assert!(!window.contains(v(10)));
        assert!(window.contains(v(11)));
        assert!(window.contains(v(15)));
        assert!(!window.contains(v(16)));
    }

    #[test]
    fn inverted_or_equal_windows_are_empty() {
        assert!(VersionWindow::new(v(5), v(5)).is_empty());
        assert!(VersionWindow::new(v(6), v(5)).is_empty());
        assert!(!VersionWindow::new(v(5), v(6)).is_empty());
    }

    #[test]
    fn records_collapse_to_distinct_ids() {
        let records = [
            record(7, 11),
            record(9, 12),
            record(7, 14),
            record(3, 10),
            record(4, 16),
        ];
        let ids = ChangedEntities::from_records(VersionWindow::new(v(10), v(15)), &records);
        assert_eq!(ids.to_raw_ids(), vec![7, 9]);
    }

    #[test]
    fn watermark_helpers() -> Result<(), crate::PrimitiveError> {
        let watermark = Watermark {
            partition_id: PartitionId::parse("1")?,
            last_version: v(10),
            last_sync_at_ms: 0,
        };
        assert!(watermark.is_caught_up(v(10)));
        assert!(!watermark.is_caught_up(v(11)));
        assert_eq!(watermark.pending_window(v(15)), VersionWindow::new(v(10), v(15)));

        let advanced = watermark.advanced_to(v(15), 99);
        assert_eq!(advanced.last_version, v(15));
        assert_eq!(advanced.last_sync_at_ms, 99);
        assert_eq!(advanced.partition_id, watermark.partition_id);
        Ok(())
    }
}
