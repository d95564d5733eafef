//! Config loading and rendering helpers for CLI surfaces.

use crate::InfraResult;
use catalog_sync_config::{
    SyncEnv, ValidatedSyncConfig, load_sync_config_from_path, to_pretty_json, to_pretty_toml,
};
use catalog_sync_shared::ErrorEnvelope;
use std::collections::BTreeMap;
use std::path::Path;

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    /// Pretty JSON.
    #[default]
    Json,
    /// Pretty TOML.
    Toml,
}

/// Load and validate the effective config from `env`, a file and overrides.
pub fn load_effective_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<ValidatedSyncConfig> {
    let env = SyncEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    load_sync_config_from_path(config_path, overrides_json, &env)
}

/// Render the effective config. Secrets never appear in the output.
pub fn render_config(config: &ValidatedSyncConfig, format: ConfigFormat) -> InfraResult<String> {
    match format {
        ConfigFormat::Json => to_pretty_json(config),
        ConfigFormat::Toml => to_pretty_toml(config),
    }
}

/// Load and validate the effective config, returning deterministic pretty JSON.
pub fn load_effective_config_json(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<String> {
    let config = load_effective_config(env, config_path, overrides_json)?;
    render_config(&config, ConfigFormat::Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn env_fills_in_storage_and_hides_token() -> InfraResult<()> {
        let env = env_with(&[
            ("CSY_CHANGELOG_PATH", "/tmp/catalog.db"),
            ("CSY_NOTIFIER_TOKEN", "s3cr3t-token"),
            ("CSY_PARTITIONS", "1,2"),
        ]);
        let json = load_effective_config_json(&env, None, None)?;
        assert!(json.contains("/tmp/catalog.db"));
        assert!(!json.contains("s3cr3t-token"));

        let config = load_effective_config(&env, None, None)?;
        let toml = render_config(&config, ConfigFormat::Toml)?;
        assert!(toml.contains("[changelog]"));
        assert!(!toml.contains("s3cr3t-token"));
        Ok(())
    }

    #[test]
    fn missing_changelog_path_is_invalid() {
        let result = load_effective_config(&BTreeMap::new(), None, None);
        assert!(result.is_err());
    }
}
