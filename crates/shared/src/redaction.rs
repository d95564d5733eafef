//! Secret detection and redaction.
//!
//! Used by the config loader (env error metadata), the JSON logger (field
//! names) and anything that renders credentials such as notifier tokens or
//! database connection strings.

/// The redacted placeholder string.
pub const REDACTED: &str = "[REDACTED]";

const SECRET_MARKERS: [&str; 7] = [
    "KEY",
    "TOKEN",
    "SECRET",
    "PASSWORD",
    "CREDENTIAL",
    "AUTH",
    "CONNECTION",
];

/// Checks if a key/variable name likely refers to a secret.
///
/// ```
/// use catalog_sync_shared::is_secret_key;
///
/// assert!(is_secret_key("CSY_NOTIFIER_TOKEN"));
/// assert!(is_secret_key("authorization"));
/// assert!(!is_secret_key("CSY_SCHEDULER_INTERVAL_MS"));
/// ```
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    SECRET_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Returns `"[REDACTED]"` for secret keys, or the original value otherwise.
pub fn redact_if_secret(key: &str, value: &str) -> String {
    if is_secret_key(key) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

/// A secret string that redacts on `Display`/`Debug`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretString(Box<str>);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<Box<str>>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value.into_boxed_str())
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_secret_patterns() {
        assert!(is_secret_key("API_KEY"));
        assert!(is_secret_key("CSY_NOTIFIER_TOKEN"));
        assert!(is_secret_key("client_secret"));
        assert!(is_secret_key("DB_PASSWORD"));
        assert!(is_secret_key("credentials"));
        assert!(is_secret_key("Authorization"));
        assert!(is_secret_key("CSY_WATERMARKS_CONNECTION"));
    }

    #[test]
    fn rejects_non_secret_patterns() {
        assert!(!is_secret_key("LOG_LEVEL"));
        assert!(!is_secret_key("partition"));
        assert!(!is_secret_key("CSY_CHANGELOG_TABLE"));
        assert!(!is_secret_key("TIMEOUT_MS"));
    }

    #[test]
    fn redacts_only_secret_values() {
        assert_eq!(redact_if_secret("token", "abc"), REDACTED);
        assert_eq!(redact_if_secret("partition", "default"), "default");
    }

    #[test]
    fn secret_string_never_prints_value() {
        let secret = SecretString::from("shh");
        assert_eq!(secret.to_string(), REDACTED);
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(secret.expose(), "shh");
    }
}
