//! Domain primitives with validated constructors.

use catalog_sync_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;

const PARTITION_ID_MAX_LEN: usize = 64;
const SQL_IDENTIFIER_MAX_LEN: usize = 63;

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// `PartitionId` is empty after trimming.
    EmptyPartitionId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `PartitionId` contains characters outside `[A-Za-z0-9_-]` or is too long.
    InvalidPartitionId {
        /// Trimmed input that failed validation.
        input: String,
    },
    /// `SqlIdentifier` violates `^[A-Za-z_][A-Za-z0-9_]*$` or the length cap.
    InvalidSqlIdentifier {
        /// Trimmed input that failed validation.
        input: String,
    },
    /// An entity id could not be parsed as an unsigned integer.
    InvalidEntityId {
        /// Raw input.
        input: String,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyPartitionId { .. } | Self::InvalidPartitionId { .. } => {
                ErrorCode::new("domain", "invalid_partition_id")
            },
            Self::InvalidSqlIdentifier { .. } => ErrorCode::new("domain", "invalid_sql_identifier"),
            Self::InvalidEntityId { .. } => ErrorCode::new("domain", "invalid_entity_id"),
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPartitionId { .. } => formatter.write_str("PartitionId must be non-empty"),
            Self::InvalidPartitionId { .. } => write!(
                formatter,
                "PartitionId must match /^[A-Za-z0-9_-]{{1,{PARTITION_ID_MAX_LEN}}}$/"
            ),
            Self::InvalidSqlIdentifier { .. } => write!(
                formatter,
                "SQL identifier must match /^[A-Za-z_][A-Za-z0-9_]*$/ (max {SQL_IDENTIFIER_MAX_LEN} chars)"
            ),
            Self::InvalidEntityId { .. } => {
                formatter.write_str("EntityId must be an unsigned integer")
            },
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            PrimitiveError::EmptyPartitionId { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::InvalidPartitionId { input }
            | PrimitiveError::InvalidSqlIdentifier { input }
            | PrimitiveError::InvalidEntityId { input } => envelope.with_metadata("input", input),
        }
    }
}

/// Identifier of a sync partition (a store).
///
/// Numeric store ids are carried as their decimal string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionId(Box<str>);

impl PartitionId {
    /// Parse a `PartitionId` from user input.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyPartitionId {
                input_length: raw.len(),
            });
        }

        let valid = trimmed.len() <= PARTITION_ID_MAX_LEN
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !valid {
            return Err(PrimitiveError::InvalidPartitionId {
                input: trimmed.to_owned(),
            });
        }

        Ok(Self(trimmed.into()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PartitionId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<String> for PartitionId {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PartitionId> for String {
    fn from(value: PartitionId) -> Self {
        value.0.into()
    }
}

/// Identifier of a changed catalog entity (a product id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Wrap a raw entity id.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Parse a decimal entity id.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        raw.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| PrimitiveError::InvalidEntityId {
                input: raw.to_owned(),
            })
    }

    /// Return the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Position in the change feed.
///
/// The feed assigns versions from a single global counter; `0` means the
/// feed has no history.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChangeVersion(u64);

impl ChangeVersion {
    /// The empty-feed version.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw version.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Return the raw version.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// True for the empty-feed version.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Number of versions between `earlier` and `self` (0 when `earlier` is ahead).
    #[must_use]
    pub const fn lag_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for ChangeVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<u64> for ChangeVersion {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A validated SQL table or column name.
///
/// Table/column names come from configuration and are interpolated into
/// statements, so only plain identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SqlIdentifier(Box<str>);

impl SqlIdentifier {
    /// Parse an identifier.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        let mut chars = trimmed.chars();
        let valid_head = chars
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
        let valid_tail = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !valid_head || !valid_tail || trimmed.len() > SQL_IDENTIFIER_MAX_LEN {
            return Err(PrimitiveError::InvalidSqlIdentifier {
                input: trimmed.to_owned(),
            });
        }
        Ok(Self(trimmed.into()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlIdentifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<String> for SqlIdentifier {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SqlIdentifier> for String {
    fn from(value: SqlIdentifier) -> Self {
        value.0.into()
    }
}
