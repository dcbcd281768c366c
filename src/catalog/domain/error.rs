//! Error types for catalog domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing catalog domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogDomainError {
    /// The registry name is empty after trimming.
    #[error("registry name must not be empty")]
    EmptyRegistryName,

    /// The registry name contains whitespace, control characters or `/`.
    #[error("registry name '{0}' contains invalid characters")]
    InvalidRegistryName(String),

    /// The registry name exceeds the storage limit.
    #[error("registry name exceeds 255 character limit: {0}")]
    RegistryNameTooLong(String),

    /// The entry name is empty after trimming.
    #[error("entry name must not be empty")]
    EmptyEntryName,

    /// The entry name contains whitespace or control characters.
    #[error("entry name '{0}' contains invalid characters")]
    InvalidEntryName(String),

    /// The entry name exceeds the storage limit.
    #[error("entry name exceeds 255 character limit: {0}")]
    EntryNameTooLong(String),

    /// A server name published through the API is not `namespace/name`.
    #[error("invalid server name '{name}': {reason}")]
    InvalidServerName {
        /// Rejected name.
        name: String,
        /// Short explanation of the failed rule.
        reason: &'static str,
    },

    /// The version string is empty after trimming.
    #[error("version must not be empty")]
    EmptyVersion,

    /// The version string contains whitespace or control characters.
    #[error("version '{0}' contains invalid characters")]
    InvalidVersion(String),

    /// The version string exceeds the storage limit.
    #[error("version exceeds 255 character limit: {0}")]
    VersionTooLong(String),

    /// A concrete version collides with the reserved `latest` token.
    #[error("version 'latest' is reserved for latest-version lookups")]
    ReservedVersion,

    /// A required text field is empty after trimming.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// A metadata blob exceeds the configured size cap.
    #[error("{field} is {size} bytes, exceeding the {limit} byte limit")]
    MetadataTooLarge {
        /// Field holding the blob.
        field: &'static str,
        /// Serialized size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// A metadata blob could not be serialized.
    #[error("{field} could not be serialized: {reason}")]
    InvalidMetadata {
        /// Field holding the blob.
        field: &'static str,
        /// Serializer message.
        reason: String,
    },

    /// A requested page size is zero.
    #[error("page size must be at least 1")]
    InvalidPageSize,

    /// Both `next` and `prev` cursors were supplied.
    #[error("only one of the next and prev cursors may be supplied")]
    ConflictingCursors,

    /// A pagination cursor could not be decoded.
    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(String),

    /// A source snapshot document is malformed.
    #[error("invalid snapshot document: {0}")]
    InvalidSnapshot(String),

    /// A sync attempt was asked to move between incompatible phases.
    #[error("invalid sync phase transition: {from} -> {to}")]
    InvalidSyncTransition {
        /// Current phase.
        from: String,
        /// Requested phase.
        to: String,
    },
}

/// Error returned while parsing a catalog enumeration from storage or input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseCatalogEnumError {
    /// Enumeration being parsed.
    pub kind: &'static str,
    /// Rejected input.
    pub value: String,
}

impl ParseCatalogEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}
