//! Validation of source snapshot documents.
//!
//! A source fetcher hands the engine an untyped JSON document:
//!
//! ```json
//! {
//!   "registry": { "name": "toolhive", "type": "FILE" },
//!   "entries": {
//!     "io.github.acme/weather": [
//!       { "version": "1.0.0", "type": "MCP", "server": { "packages": [] } },
//!       { "version": "2.0.0", "type": "MCP", "latest": true, "server": {} }
//!     ],
//!     "acme/review": { "version": "0.3.0", "type": "SKILL", "skill": { "namespace": "acme" } }
//!   }
//! }
//! ```
//!
//! Each entry name maps to one version object or an array of them. Parsing
//! checks every field before the engine touches storage.

use super::{
    CatalogDomainError, DeclaredRegistry, EntryName, EntryType, EntryVersion, IconTheme,
    InputVariable, MetadataBlob, PackageTransport, RegistryName, RegistryType, ServerDetails,
    ServerIcon, ServerPackage, ServerPayload, ServerRemote, SkillDetails, SkillGitPackage,
    SkillOciPackage, SkillPayload, SkillStatus, SourceRepository,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Type-specific payload carried by a snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotPayload {
    /// Server version payload.
    Server(ServerPayload),
    /// Skill version payload.
    Skill(SkillPayload),
}

impl SnapshotPayload {
    /// Returns the entry type the payload belongs to.
    #[must_use]
    pub const fn entry_type(&self) -> EntryType {
        match self {
            Self::Server(_) => EntryType::Mcp,
            Self::Skill(_) => EntryType::Skill,
        }
    }
}

/// One validated version from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Entry name.
    pub name: EntryName,
    /// Concrete version.
    pub version: EntryVersion,
    /// Display title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Whether this version is designated latest for its name.
    pub is_latest: bool,
    /// Type-specific payload.
    pub payload: SnapshotPayload,
}

impl SnapshotEntry {
    /// Returns the entry type.
    #[must_use]
    pub const fn entry_type(&self) -> EntryType {
        self.payload.entry_type()
    }
}

/// Validated snapshot of one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    registry: DeclaredRegistry,
    entries: Vec<SnapshotEntry>,
}

impl SourceSnapshot {
    /// Creates a snapshot from already validated parts.
    ///
    /// Latest designations are resolved per name exactly as [`Self::parse`]
    /// does.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::InvalidSnapshot`] for duplicate versions,
    /// mixed entry types under one name, or more than one version of a name
    /// flagged latest.
    pub fn new(
        registry: DeclaredRegistry,
        entries: Vec<SnapshotEntry>,
    ) -> Result<Self, CatalogDomainError> {
        let mut grouped: BTreeMap<EntryName, Vec<SnapshotEntry>> = BTreeMap::new();
        for entry in entries {
            grouped.entry(entry.name.clone()).or_default().push(entry);
        }

        let mut resolved = Vec::new();
        for (name, versions) in grouped {
            resolved.extend(resolve_latest(&name, versions)?);
        }

        Ok(Self {
            registry,
            entries: resolved,
        })
    }

    /// Parses and validates a raw snapshot document.
    ///
    /// Metadata blobs larger than `max_metadata_bytes` are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError`] describing the first problem found.
    pub fn parse(document: Value, max_metadata_bytes: usize) -> Result<Self, CatalogDomainError> {
        let raw: RawDocument = from_value("snapshot", document)?;

        let registry_name = RegistryName::new(raw.registry.name)?;
        let registry_type = RegistryType::try_from(raw.registry.registry_type.as_str())
            .map_err(|err| invalid(err.to_string()))?;
        let registry = DeclaredRegistry::new(registry_name, registry_type);

        let mut entries = Vec::new();
        for (raw_name, value) in raw.entries {
            let name = EntryName::new(raw_name)?;
            for raw_entry in versions_of(&name, value)? {
                entries.push(convert_entry(&name, raw_entry, max_metadata_bytes)?);
            }
        }

        Self::new(registry, entries)
    }

    /// Returns the registry the snapshot describes.
    #[must_use]
    pub const fn registry(&self) -> &DeclaredRegistry {
        &self.registry
    }

    /// Returns the entries grouped by name, in name order.
    #[must_use]
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Returns the set of names present in the snapshot.
    #[must_use]
    pub fn names(&self) -> HashSet<&EntryName> {
        self.entries.iter().map(|entry| &entry.name).collect()
    }

    /// Consumes the snapshot, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (DeclaredRegistry, Vec<SnapshotEntry>) {
        (self.registry, self.entries)
    }
}

fn resolve_latest(
    name: &EntryName,
    mut versions: Vec<SnapshotEntry>,
) -> Result<Vec<SnapshotEntry>, CatalogDomainError> {
    let mut seen = HashSet::new();
    for entry in &versions {
        if !seen.insert(entry.version.clone()) {
            return Err(invalid(format!(
                "entry '{name}' lists version '{}' more than once",
                entry.version
            )));
        }
    }

    let first_type = versions.first().map(SnapshotEntry::entry_type);
    if versions
        .iter()
        .any(|entry| Some(entry.entry_type()) != first_type)
    {
        return Err(invalid(format!("entry '{name}' mixes MCP and SKILL versions")));
    }

    let flagged = versions.iter().filter(|entry| entry.is_latest).count();
    if flagged > 1 {
        return Err(invalid(format!(
            "entry '{name}' flags {flagged} versions as latest"
        )));
    }

    if flagged == 0
        && let Some(last) = versions.last_mut()
    {
        last.is_latest = true;
    }

    Ok(versions)
}

fn versions_of(name: &EntryName, value: Value) -> Result<Vec<RawEntry>, CatalogDomainError> {
    match value {
        Value::Array(items) if items.is_empty() => {
            Err(invalid(format!("entry '{name}' lists no versions")))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| from_value(name.as_str(), item))
            .collect(),
        single => Ok(vec![from_value(name.as_str(), single)?]),
    }
}

fn convert_entry(
    name: &EntryName,
    raw: RawEntry,
    limit: usize,
) -> Result<SnapshotEntry, CatalogDomainError> {
    let version = EntryVersion::new(raw.version)?;
    let entry_type =
        EntryType::try_from(raw.entry_type.as_str()).map_err(|err| invalid(err.to_string()))?;

    let payload = match (entry_type, raw.server, raw.skill) {
        (EntryType::Mcp, Some(server), None) => SnapshotPayload::Server(convert_server(server, limit)?),
        (EntryType::Skill, None, Some(skill)) => SnapshotPayload::Skill(convert_skill(skill, limit)?),
        (EntryType::Mcp, _, _) => {
            return Err(invalid(format!(
                "MCP entry '{name}@{version}' must carry exactly a server payload"
            )));
        }
        (EntryType::Skill, _, _) => {
            return Err(invalid(format!(
                "SKILL entry '{name}@{version}' must carry exactly a skill payload"
            )));
        }
    };

    Ok(SnapshotEntry {
        name: name.clone(),
        version,
        title: raw.title,
        description: raw.description,
        is_latest: raw.latest,
        payload,
    })
}

fn convert_server(raw: RawServer, limit: usize) -> Result<ServerPayload, CatalogDomainError> {
    let repository = raw
        .repository
        .map(|repo| {
            Ok::<_, CatalogDomainError>(SourceRepository {
                url: required("repository.url", repo.url)?,
                source: repo.source,
                id: repo.id,
                subfolder: repo.subfolder,
            })
        })
        .transpose()?;

    let details = ServerDetails {
        website_url: raw.website_url,
        repository,
        upstream_meta: MetadataBlob::from_optional_json(
            "upstream_meta",
            raw.upstream_meta.as_ref(),
            limit,
        )?,
        server_meta: MetadataBlob::from_optional_json(
            "server_meta",
            raw.server_meta.as_ref(),
            limit,
        )?,
    };

    let packages = raw
        .packages
        .into_iter()
        .map(|package| {
            Ok(ServerPackage {
                registry_type: required("package.registry_type", package.registry_type)?,
                registry_base_url: package.registry_base_url,
                identifier: required("package.identifier", package.identifier)?,
                version: package.version,
                runtime_hint: package.runtime_hint,
                runtime_arguments: package.runtime_arguments,
                transport: PackageTransport {
                    transport_type: required(
                        "package.transport.type",
                        package.transport.transport_type,
                    )?,
                    url: package.transport.url,
                },
                environment_variables: package.environment_variables,
            })
        })
        .collect::<Result<Vec<_>, CatalogDomainError>>()?;

    let mut remote_keys = HashSet::new();
    let mut remotes = Vec::new();
    for remote in raw.remotes {
        let transport_type = required("remote.type", remote.transport_type)?;
        let url = required("remote.url", remote.url)?;
        if !remote_keys.insert((transport_type.clone(), url.clone())) {
            return Err(invalid(format!(
                "remote {transport_type} {url} is listed more than once"
            )));
        }
        remotes.push(ServerRemote {
            transport_type,
            url,
            headers: remote.headers,
        });
    }

    let mut icons: BTreeMap<IconTheme, ServerIcon> = BTreeMap::new();
    for icon in raw.icons {
        let theme = icon
            .theme
            .as_deref()
            .map_or(Ok(IconTheme::Any), IconTheme::try_from)
            .map_err(|err| invalid(err.to_string()))?;
        icons.insert(
            theme,
            ServerIcon {
                src: required("icon.src", icon.src)?,
                mime_type: icon.mime_type,
                theme,
                sizes: icon.sizes,
            },
        );
    }

    Ok(ServerPayload {
        details,
        packages,
        remotes,
        icons: icons.into_values().collect(),
    })
}

fn convert_skill(raw: RawSkill, limit: usize) -> Result<SkillPayload, CatalogDomainError> {
    let status = raw
        .status
        .as_deref()
        .map_or(Ok(SkillStatus::Active), SkillStatus::try_from)
        .map_err(|err| invalid(err.to_string()))?;

    let details = SkillDetails {
        namespace: required("skill.namespace", raw.namespace)?,
        status,
        license: raw.license,
        compatibility: raw.compatibility,
        allowed_tools: raw.allowed_tools,
        repository: MetadataBlob::from_optional_json("repository", raw.repository.as_ref(), limit)?,
        icons: MetadataBlob::from_optional_json("icons", raw.icons.as_ref(), limit)?,
        metadata: MetadataBlob::from_optional_json("metadata", raw.metadata.as_ref(), limit)?,
    };

    let git_packages = raw
        .git_packages
        .into_iter()
        .map(|package| {
            Ok(SkillGitPackage {
                url: required("git_package.url", package.url)?,
                ..package
            })
        })
        .collect::<Result<Vec<_>, CatalogDomainError>>()?;

    let oci_packages = raw
        .oci_packages
        .into_iter()
        .map(|package| {
            Ok(SkillOciPackage {
                identifier: required("oci_package.identifier", package.identifier)?,
                ..package
            })
        })
        .collect::<Result<Vec<_>, CatalogDomainError>>()?;

    Ok(SkillPayload {
        details,
        git_packages,
        oci_packages,
    })
}

fn required(field: &'static str, value: String) -> Result<String, CatalogDomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogDomainError::EmptyField(field));
    }
    Ok(trimmed.to_owned())
}

fn from_value<T: DeserializeOwned>(context: &str, value: Value) -> Result<T, CatalogDomainError> {
    serde_json::from_value(value).map_err(|err| invalid(format!("{context}: {err}")))
}

fn invalid(message: impl Into<String>) -> CatalogDomainError {
    CatalogDomainError::InvalidSnapshot(message.into())
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    registry: RawRegistry,
    #[serde(default)]
    entries: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    name: String,
    #[serde(rename = "type")]
    registry_type: String,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    version: String,
    #[serde(rename = "type")]
    entry_type: String,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    latest: bool,
    server: Option<RawServer>,
    skill: Option<RawSkill>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    website_url: Option<String>,
    repository: Option<RawRepository>,
    upstream_meta: Option<Value>,
    server_meta: Option<Value>,
    #[serde(default)]
    packages: Vec<RawPackage>,
    #[serde(default)]
    remotes: Vec<RawRemote>,
    #[serde(default)]
    icons: Vec<RawIcon>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    url: String,
    source: Option<String>,
    id: Option<String>,
    subfolder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    registry_type: String,
    registry_base_url: Option<String>,
    identifier: String,
    version: Option<String>,
    runtime_hint: Option<String>,
    #[serde(default)]
    runtime_arguments: Vec<String>,
    transport: RawTransport,
    #[serde(default)]
    environment_variables: Vec<InputVariable>,
}

#[derive(Debug, Deserialize)]
struct RawTransport {
    #[serde(rename = "type")]
    transport_type: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRemote {
    #[serde(rename = "type")]
    transport_type: String,
    url: String,
    #[serde(default)]
    headers: Vec<InputVariable>,
}

#[derive(Debug, Deserialize)]
struct RawIcon {
    src: String,
    mime_type: Option<String>,
    theme: Option<String>,
    #[serde(default)]
    sizes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSkill {
    namespace: String,
    status: Option<String>,
    license: Option<String>,
    compatibility: Option<String>,
    #[serde(default)]
    allowed_tools: Vec<String>,
    repository: Option<Value>,
    icons: Option<Value>,
    metadata: Option<Value>,
    #[serde(default)]
    git_packages: Vec<SkillGitPackage>,
    #[serde(default)]
    oci_packages: Vec<SkillOciPackage>,
}
