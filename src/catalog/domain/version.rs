//! Version strings and the reserved `latest` lookup token.

use super::CatalogDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal token that resolves through the latest-version pointer.
pub const LATEST_VERSION_TOKEN: &str = "latest";

/// Maximum length for a version string, matching the schema limit.
const MAX_VERSION_LENGTH: usize = 255;

/// Concrete version of a registry entry.
///
/// Versions are opaque strings ordered bytewise; the catalog never interprets
/// them as semantic versions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryVersion(String);

impl EntryVersion {
    /// Creates a validated concrete version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::ReservedVersion`] for the literal
    /// `latest` (in any case) and other variants for empty, overlong or
    /// whitespace-bearing input.
    pub fn new(value: impl Into<String>) -> Result<Self, CatalogDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(CatalogDomainError::EmptyVersion);
        }

        if normalized.eq_ignore_ascii_case(LATEST_VERSION_TOKEN) {
            return Err(CatalogDomainError::ReservedVersion);
        }

        if normalized
            .chars()
            .any(|character| character.is_whitespace() || character.is_control())
        {
            return Err(CatalogDomainError::InvalidVersion(normalized));
        }

        if normalized.chars().count() > MAX_VERSION_LENGTH {
            return Err(CatalogDomainError::VersionTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntryVersion {
    type Error = CatalogDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntryVersion> for String {
    fn from(value: EntryVersion) -> Self {
        value.0
    }
}

impl AsRef<str> for EntryVersion {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EntryVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Version selector accepted by point lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionRef {
    /// Resolve through the latest-version pointer.
    Latest,
    /// A concrete version.
    Exact(EntryVersion),
}

impl VersionRef {
    /// Parses a selector, mapping the reserved token to [`Self::Latest`].
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError`] when the input is neither the reserved
    /// token nor a valid concrete version.
    pub fn parse(value: &str) -> Result<Self, CatalogDomainError> {
        if value.trim().eq_ignore_ascii_case(LATEST_VERSION_TOKEN) {
            return Ok(Self::Latest);
        }
        EntryVersion::new(value).map(Self::Exact)
    }

    /// Returns whether this selector resolves through the latest pointer.
    #[must_use]
    pub const fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => formatter.write_str(LATEST_VERSION_TOKEN),
            Self::Exact(version) => version.fmt(formatter),
        }
    }
}
