//! Registry aggregate and its provenance enumerations.

use super::{CatalogDomainError, ParseCatalogEnumError, RegistryId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a registry name, matching the schema limit.
const MAX_REGISTRY_NAME_LENGTH: usize = 255;

/// Validated, globally unique registry name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegistryName(String);

impl RegistryName {
    /// Creates a validated registry name.
    ///
    /// The input is trimmed. Whitespace, control characters and `/` are
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, CatalogDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(CatalogDomainError::EmptyRegistryName);
        }

        let is_valid = normalized
            .chars()
            .all(|character| !character.is_whitespace() && !character.is_control() && character != '/');
        if !is_valid {
            return Err(CatalogDomainError::InvalidRegistryName(normalized));
        }

        if normalized.chars().count() > MAX_REGISTRY_NAME_LENGTH {
            return Err(CatalogDomainError::RegistryNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the registry name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RegistryName {
    type Error = CatalogDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegistryName> for String {
    fn from(value: RegistryName) -> Self {
        value.0
    }
}

impl AsRef<str> for RegistryName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RegistryName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Where a registry's entries come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryType {
    /// A document on a mounted file or cluster config object.
    File,
    /// An upstream registry reached over the network.
    Remote,
    /// Entries published directly through the API.
    Managed,
}

impl RegistryType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Remote => "REMOTE",
            Self::Managed => "MANAGED",
        }
    }

    /// Returns whether registries of this type are synced from a source by
    /// default.
    #[must_use]
    pub const fn is_syncable_by_default(self) -> bool {
        matches!(self, Self::File | Self::Remote)
    }
}

impl fmt::Display for RegistryType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RegistryType {
    type Error = ParseCatalogEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FILE" => Ok(Self::File),
            "REMOTE" => Ok(Self::Remote),
            "MANAGED" => Ok(Self::Managed),
            _ => Err(ParseCatalogEnumError::new("registry type", value)),
        }
    }
}

/// Provenance of a registry or entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreationType {
    /// Created by configuration-driven sync.
    Config,
    /// Created directly through the API; immune to sync mutation.
    Api,
}

impl CreationType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "CONFIG",
            Self::Api => "API",
        }
    }

    /// Returns whether records of this provenance are protected from sync.
    #[must_use]
    pub const fn is_protected(self) -> bool {
        matches!(self, Self::Api)
    }
}

impl fmt::Display for CreationType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CreationType {
    type Error = ParseCatalogEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CONFIG" => Ok(Self::Config),
            "API" => Ok(Self::Api),
            _ => Err(ParseCatalogEnumError::new("creation type", value)),
        }
    }
}

/// Named source of catalog entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    id: RegistryId,
    name: RegistryName,
    reg_type: RegistryType,
    creation_type: CreationType,
    syncable: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRegistryData {
    /// Persisted identifier.
    pub id: RegistryId,
    /// Persisted unique name.
    pub name: RegistryName,
    /// Persisted source type.
    pub reg_type: RegistryType,
    /// Persisted provenance.
    pub creation_type: CreationType,
    /// Persisted sync eligibility.
    pub syncable: bool,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Registry {
    /// Creates a new registry. Sync eligibility defaults from the type.
    #[must_use]
    pub fn new(
        name: RegistryName,
        reg_type: RegistryType,
        creation_type: CreationType,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: RegistryId::new(),
            name,
            reg_type,
            creation_type,
            syncable: reg_type.is_syncable_by_default(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a registry from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedRegistryData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            reg_type: data.reg_type,
            creation_type: data.creation_type,
            syncable: data.syncable,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Overrides sync eligibility.
    #[must_use]
    pub const fn with_syncable(mut self, syncable: bool) -> Self {
        self.syncable = syncable;
        self
    }

    /// Returns the registry identifier.
    #[must_use]
    pub const fn id(&self) -> RegistryId {
        self.id
    }

    /// Returns the registry name.
    #[must_use]
    pub const fn name(&self) -> &RegistryName {
        &self.name
    }

    /// Returns the source type.
    #[must_use]
    pub const fn reg_type(&self) -> RegistryType {
        self.reg_type
    }

    /// Returns the provenance.
    #[must_use]
    pub const fn creation_type(&self) -> CreationType {
        self.creation_type
    }

    /// Returns whether the registry takes part in scheduled syncs.
    #[must_use]
    pub const fn is_syncable(&self) -> bool {
        self.syncable
    }

    /// Returns whether sync-driven writes must leave this registry alone.
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
}

/// One row of a bulk registry upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryUpsert {
    /// Identifier used when the row is inserted.
    pub id: RegistryId,
    /// Unique registry name; the conflict key.
    pub name: RegistryName,
    /// Source type written on insert and on CONFIG update.
    pub reg_type: RegistryType,
    /// Provenance written on insert.
    pub creation_type: CreationType,
    /// Sync eligibility written on insert and on CONFIG update.
    pub syncable: bool,
    /// Timestamp used for `created_at` on insert and `updated_at` always.
    pub timestamp: DateTime<Utc>,
}

/// Registry declared by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRegistry {
    /// Declared registry name.
    pub name: RegistryName,
    /// Declared source type.
    pub reg_type: RegistryType,
}

impl DeclaredRegistry {
    /// Creates a registry declaration.
    #[must_use]
    pub const fn new(name: RegistryName, reg_type: RegistryType) -> Self {
        Self { name, reg_type }
    }

    /// Builds the CONFIG upsert row for this declaration.
    #[must_use]
    pub fn to_upsert(&self, timestamp: DateTime<Utc>) -> RegistryUpsert {
        RegistryUpsert {
            id: RegistryId::new(),
            name: self.name.clone(),
            reg_type: self.reg_type,
            creation_type: CreationType::Config,
            syncable: self.reg_type.is_syncable_by_default(),
            timestamp,
        }
    }
}
