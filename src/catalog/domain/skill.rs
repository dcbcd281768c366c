//! Skill version payload and its package collections.

use super::{MetadataBlob, ParseCatalogEnumError, RegistryEntry, RegistryName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Publication status of a skill version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillStatus {
    /// Available for installation.
    #[default]
    Active,
    /// Still installable but superseded.
    Deprecated,
    /// Withdrawn by the publisher.
    Deleted,
}

impl SkillStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Deprecated => "DEPRECATED",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for SkillStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SkillStatus {
    type Error = ParseCatalogEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "DEPRECATED" => Ok(Self::Deprecated),
            "DELETED" => Ok(Self::Deleted),
            _ => Err(ParseCatalogEnumError::new("skill status", value)),
        }
    }
}

/// Version-specific skill fields stored 1:1 with the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDetails {
    /// Publisher namespace.
    pub namespace: String,
    /// Publication status.
    pub status: SkillStatus,
    /// SPDX license expression.
    pub license: Option<String>,
    /// Free-form compatibility statement.
    pub compatibility: Option<String>,
    /// Tools the skill is allowed to invoke.
    pub allowed_tools: Vec<String>,
    /// Repository document.
    pub repository: Option<MetadataBlob>,
    /// Icon document.
    pub icons: Option<MetadataBlob>,
    /// Arbitrary publisher metadata.
    pub metadata: Option<MetadataBlob>,
}

/// Skill distributed from a git repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillGitPackage {
    /// Clone URL.
    pub url: String,
    /// Branch or tag.
    #[serde(alias = "ref")]
    pub git_ref: Option<String>,
    /// Pinned commit.
    pub commit: Option<String>,
    /// Path within the repository holding the skill.
    pub subfolder: Option<String>,
}

/// Skill distributed as an OCI artefact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillOciPackage {
    /// Image reference.
    pub identifier: String,
    /// Content digest.
    pub digest: Option<String>,
    /// Artefact media type.
    pub media_type: Option<String>,
}

/// Complete skill payload written for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillPayload {
    /// Version row fields.
    pub details: SkillDetails,
    /// Git package children.
    pub git_packages: Vec<SkillGitPackage>,
    /// OCI package children.
    pub oci_packages: Vec<SkillOciPackage>,
}

/// Skill version row joined with its entry and registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillVersion {
    /// Owning entry.
    pub entry: RegistryEntry,
    /// Name of the owning registry.
    pub registry_name: RegistryName,
    /// Version row fields.
    pub details: SkillDetails,
    /// Whether the latest pointer for this name references this entry.
    pub is_latest: bool,
}

/// Skill version hydrated with its packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillVersionDetail {
    /// Version row joined with its entry.
    pub version: SkillVersion,
    /// Git packages in insertion order.
    pub git_packages: Vec<SkillGitPackage>,
    /// OCI packages in insertion order.
    pub oci_packages: Vec<SkillOciPackage>,
}
