//! Registry entry record: one version of one named server or skill.

use super::{
    CatalogDomainError, CreationType, EntryId, EntryVersion, ParseCatalogEnumError, RegistryId,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for an entry name, matching the schema limit.
const MAX_ENTRY_NAME_LENGTH: usize = 255;

/// Kind of item an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// An MCP server; payload lives in the server version tables.
    Mcp,
    /// A skill; payload lives in the skill version tables.
    Skill,
}

impl EntryType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mcp => "MCP",
            Self::Skill => "SKILL",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EntryType {
    type Error = ParseCatalogEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MCP" => Ok(Self::Mcp),
            "SKILL" => Ok(Self::Skill),
            _ => Err(ParseCatalogEnumError::new("entry type", value)),
        }
    }
}

/// Validated entry name.
///
/// Sync-sourced names only need to be non-empty and free of whitespace; the
/// stricter reverse-DNS rule for API-published servers lives in
/// [`super::ServerName`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryName(String);

impl EntryName {
    /// Creates a validated entry name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError`] when the name is empty, overlong or
    /// contains whitespace or control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, CatalogDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(CatalogDomainError::EmptyEntryName);
        }

        if normalized
            .chars()
            .any(|character| character.is_whitespace() || character.is_control())
        {
            return Err(CatalogDomainError::InvalidEntryName(normalized));
        }

        if normalized.chars().count() > MAX_ENTRY_NAME_LENGTH {
            return Err(CatalogDomainError::EntryNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the entry name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntryName {
    type Error = CatalogDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntryName> for String {
    fn from(value: EntryName) -> Self {
        value.0
    }
}

impl AsRef<str> for EntryName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Descriptive fields supplied when an entry is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntryParams {
    /// Owning registry.
    pub reg_id: RegistryId,
    /// Server or skill.
    pub entry_type: EntryType,
    /// Entry name.
    pub name: EntryName,
    /// Concrete version.
    pub version: EntryVersion,
    /// Optional display title.
    pub title: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Provenance of the write.
    pub creation_type: CreationType,
}

/// One version of one named item within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    id: EntryId,
    reg_id: RegistryId,
    entry_type: EntryType,
    name: EntryName,
    version: EntryVersion,
    title: Option<String>,
    description: Option<String>,
    creation_type: CreationType,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntryData {
    /// Persisted identifier.
    pub id: EntryId,
    /// Persisted owning registry.
    pub reg_id: RegistryId,
    /// Persisted entry type.
    pub entry_type: EntryType,
    /// Persisted name.
    pub name: EntryName,
    /// Persisted version.
    pub version: EntryVersion,
    /// Persisted title.
    pub title: Option<String>,
    /// Persisted description.
    pub description: Option<String>,
    /// Persisted provenance.
    pub creation_type: CreationType,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RegistryEntry {
    /// Creates a new entry with a fresh identifier.
    #[must_use]
    pub fn new(params: NewEntryParams, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: EntryId::new(),
            reg_id: params.reg_id,
            entry_type: params.entry_type,
            name: params.name,
            version: params.version,
            title: normalize_optional(params.title),
            description: normalize_optional(params.description),
            creation_type: params.creation_type,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs an entry from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedEntryData) -> Self {
        Self {
            id: data.id,
            reg_id: data.reg_id,
            entry_type: data.entry_type,
            name: data.name,
            version: data.version,
            title: data.title,
            description: data.description,
            creation_type: data.creation_type,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns a copy re-homed onto another registry.
    #[must_use]
    pub fn in_registry(mut self, reg_id: RegistryId) -> Self {
        self.reg_id = reg_id;
        self
    }

    /// Returns the entry identifier.
    #[must_use]
    pub const fn id(&self) -> EntryId {
        self.id
    }

    /// Returns the owning registry.
    #[must_use]
    pub const fn reg_id(&self) -> RegistryId {
        self.reg_id
    }

    /// Returns the entry type.
    #[must_use]
    pub const fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Returns the entry name.
    #[must_use]
    pub const fn name(&self) -> &EntryName {
        &self.name
    }

    /// Returns the concrete version.
    #[must_use]
    pub const fn version(&self) -> &EntryVersion {
        &self.version
    }

    /// Returns the display title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the provenance.
    #[must_use]
    pub const fn creation_type(&self) -> CreationType {
        self.creation_type
    }

    /// Returns whether sync-driven writes must leave this entry alone.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.creation_type.is_protected()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether `search` occurs in the name, title or description,
    /// ignoring ASCII case.
    #[must_use]
    pub fn matches_search(&self, search: &str) -> bool {
        let needle = search.to_lowercase();
        [Some(self.name.as_str()), self.title(), self.description()]
            .into_iter()
            .flatten()
            .any(|haystack| haystack.to_lowercase().contains(&needle))
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}
