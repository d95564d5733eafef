//! Environment validation helpers for CLI surfaces.

use catalog_sync_config::SyncEnv;
use catalog_sync_shared::ErrorEnvelope;
use std::collections::BTreeMap;

/// Infra-level error type (shared error envelope).
pub type InfraError = ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Check that every `CSY_*` variable in `env` parses.
///
/// Storage locations are not required here; a missing changelog path only
/// fails once a full config is validated.
pub fn validate_env_parsing(env: &BTreeMap<String, String>) -> InfraResult<SyncEnv> {
    SyncEnv::from_map(env).map_err(ErrorEnvelope::from)
}
