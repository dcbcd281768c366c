//! MCP server version payload and its child collections.

use super::{MetadataBlob, ParseCatalogEnumError, RegistryEntry, RegistryName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source repository coordinates advertised by a server version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepository {
    /// Repository URL.
    pub url: String,
    /// Hosting service, for example `github`.
    pub source: Option<String>,
    /// Host-specific repository identifier.
    pub id: Option<String>,
    /// Path within the repository holding the server.
    pub subfolder: Option<String>,
}

/// Version-specific server fields stored 1:1 with the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    /// Project website.
    pub website_url: Option<String>,
    /// Source repository coordinates.
    pub repository: Option<SourceRepository>,
    /// Metadata the upstream registry attached to this version.
    pub upstream_meta: Option<MetadataBlob>,
    /// Metadata the server publisher attached to this version.
    pub server_meta: Option<MetadataBlob>,
}

/// Named input such as an environment variable or HTTP header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVariable {
    /// Variable or header name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fixed value, when the publisher supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Default value offered to the installer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Whether the installer must supply a value.
    #[serde(default)]
    pub is_required: bool,
    /// Whether the value is sensitive.
    #[serde(default)]
    pub is_secret: bool,
}

/// How a packaged server is reached once installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTransport {
    /// Transport kind, for example `stdio` or `streamable-http`.
    pub transport_type: String,
    /// Endpoint for network transports.
    pub url: Option<String>,
}

/// Installable package for a server version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPackage {
    /// Package ecosystem, for example `npm` or `oci`.
    pub registry_type: String,
    /// Base URL of the package registry.
    pub registry_base_url: Option<String>,
    /// Package identifier within the ecosystem.
    pub identifier: String,
    /// Package version.
    pub version: Option<String>,
    /// Runtime used to launch the package, for example `npx`.
    pub runtime_hint: Option<String>,
    /// Arguments passed to the runtime.
    pub runtime_arguments: Vec<String>,
    /// Transport exposed by the launched package.
    pub transport: PackageTransport,
    /// Environment variables read by the package.
    pub environment_variables: Vec<InputVariable>,
}

/// Hosted endpoint for a server version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRemote {
    /// Transport kind; part of the uniqueness key.
    pub transport_type: String,
    /// Endpoint URL; part of the uniqueness key.
    pub url: String,
    /// Headers the client must send.
    pub headers: Vec<InputVariable>,
}

/// Display theme an icon targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconTheme {
    /// Suitable for any background.
    Any,
    /// Intended for dark backgrounds.
    Dark,
    /// Intended for light backgrounds.
    Light,
}

impl IconTheme {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

impl fmt::Display for IconTheme {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for IconTheme {
    type Error = ParseCatalogEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            _ => Err(ParseCatalogEnumError::new("icon theme", value)),
        }
    }
}

/// Icon for a server version; at most one per theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIcon {
    /// Icon URL or data URI.
    pub src: String,
    /// Declared MIME type.
    pub mime_type: Option<String>,
    /// Target theme; the upsert key within an entry.
    pub theme: IconTheme,
    /// Declared sizes, for example `48x48`.
    pub sizes: Vec<String>,
}

/// Complete server payload written for one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerPayload {
    /// Version row fields.
    pub details: ServerDetails,
    /// Package children.
    pub packages: Vec<ServerPackage>,
    /// Remote children.
    pub remotes: Vec<ServerRemote>,
    /// Icon children.
    pub icons: Vec<ServerIcon>,
}

/// Server version row joined with its entry and registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    /// Owning entry.
    pub entry: RegistryEntry,
    /// Name of the owning registry.
    pub registry_name: RegistryName,
    /// Version row fields.
    pub details: ServerDetails,
    /// Whether the latest pointer for this name references this entry.
    pub is_latest: bool,
}

/// Server version hydrated with its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersionDetail {
    /// Version row joined with its entry.
    pub version: ServerVersion,
    /// Package children in insertion order.
    pub packages: Vec<ServerPackage>,
    /// Remote children in insertion order.
    pub remotes: Vec<ServerRemote>,
    /// Icon children ordered by theme.
    pub icons: Vec<ServerIcon>,
}
