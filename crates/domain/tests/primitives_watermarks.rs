//! Integration coverage for domain primitives and change windows.

use catalog_sync_domain::{
    ChangeRecord, ChangeVersion, ChangedEntities, EntityId, PartitionId, PrimitiveError,
    SqlIdentifier, VersionWindow,
};
use catalog_sync_shared::ErrorEnvelope;
use proptest::prelude::*;

#[test]
fn primitive_errors_map_into_error_envelopes() -> Result<(), PrimitiveError> {
    let Err(error) = PartitionId::parse(" ") else {
        return Err(PrimitiveError::EmptyPartitionId { input_length: 0 });
    };

    let envelope: ErrorEnvelope = error.into();
    assert_eq!(envelope.code.namespace(), "domain");
    assert_eq!(envelope.code.code(), "invalid_partition_id");
    assert_eq!(
        envelope.metadata.get("input_length"),
        Some(&"1".to_string())
    );
    Ok(())
}

#[test]
fn sql_identifier_errors_surface_input() -> Result<(), PrimitiveError> {
    let Err(error) = SqlIdentifier::parse("bad-name") else {
        return Err(PrimitiveError::InvalidSqlIdentifier {
            input: "bad-name".to_string(),
        });
    };

    let envelope: ErrorEnvelope = error.into();
    assert_eq!(envelope.code.code(), "invalid_sql_identifier");
    assert_eq!(
        envelope.metadata.get("input"),
        Some(&"bad-name".to_string())
    );
    Ok(())
}

fn records_strategy() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((0u64..50, 1u64..100), 0..64)
}

proptest! {
    #[test]
    fn changed_entities_cover_exactly_the_window(
        rows in records_strategy(),
        after in 0u64..100,
        span in 0u64..100,
    ) {
        let window = VersionWindow::new(ChangeVersion::new(after), ChangeVersion::new(after + span));
        let records: Vec<ChangeRecord> = rows
            .iter()
            .map(|&(entity, version)| ChangeRecord {
                entity_id: EntityId::new(entity),
                version: ChangeVersion::new(version),
            })
            .collect();

        let ids = ChangedEntities::from_records(window, &records);

        for record in &records {
            if window.contains(record.version) {
                prop_assert!(ids.contains(record.entity_id));
            }
        }
        for id in ids.iter() {
            prop_assert!(records
                .iter()
                .any(|record| record.entity_id == id && window.contains(record.version)));
        }
        let raw = ids.to_raw_ids();
        prop_assert!(raw.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn adjacent_windows_partition_the_versions(split in 0u64..50, end in 50u64..100, version in 1u64..100) {
        let first = VersionWindow::new(ChangeVersion::ZERO, ChangeVersion::new(split));
        let second = VersionWindow::new(ChangeVersion::new(split), ChangeVersion::new(end));
        let v = ChangeVersion::new(version);
        if version <= end {
            prop_assert!(first.contains(v) ^ second.contains(v));
        } else {
            prop_assert!(!first.contains(v) && !second.contains(v));
        }
    }
}
