//! Publishing through the API: registries and versions with `API`
//! provenance, which background sync never modifies or deletes.
//!
//! Versions are only published into `API`-owned registries. A
//! configuration-managed registry can be dropped by reconciliation, which
//! would take published versions with it.

use super::hydrate::{hydrate_servers, hydrate_skills};
use crate::catalog::{
    config::CatalogConfig,
    domain::{
        CatalogDomainError, CreationType, EntryName, EntryType, EntryVersion,
        LatestVersionPointer, MetadataBlob, NewEntryParams, Registry, RegistryEntry, RegistryName,
        RegistryType, ServerName, ServerPayload, ServerVersionDetail, SkillPayload,
        SkillVersionDetail, VersionRef,
    },
    ports::{CatalogStore, CatalogStoreError, CatalogTransaction},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Service-level errors for publishing operations.
#[derive(Debug, Clone, Error)]
pub enum CatalogAdminError {
    /// Input failed validation.
    #[error(transparent)]
    Domain(#[from] CatalogDomainError),
    /// Storage rejected the write.
    #[error(transparent)]
    Store(#[from] CatalogStoreError),
}

/// Result type for publishing operations.
pub type CatalogAdminResult<T> = Result<T, CatalogAdminError>;

/// Request to create an `API`-owned registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRegistryRequest {
    /// Unique registry name.
    pub name: String,
    /// Registry kind; defaults to `MANAGED`.
    pub reg_type: RegistryType,
}

impl CreateRegistryRequest {
    /// Creates a request for a `MANAGED` registry.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reg_type: RegistryType::Managed,
        }
    }

    /// Overrides the registry kind.
    #[must_use]
    pub const fn with_type(mut self, reg_type: RegistryType) -> Self {
        self.reg_type = reg_type;
        self
    }
}

/// Version metadata shared by server and skill publish requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// Registry receiving the version.
    pub registry: String,
    /// Entry name.
    pub name: String,
    /// Concrete version; `latest` is reserved.
    pub version: String,
    /// Display title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Whether to point the name's latest pointer at this version.
    pub make_latest: bool,
}

impl PublishTarget {
    /// Creates a target without title, description or latest promotion.
    #[must_use]
    pub fn new(
        registry: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            name: name.into(),
            version: version.into(),
            title: None,
            description: None,
            make_latest: false,
        }
    }

    /// Sets the display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Promotes the version to latest on publish.
    #[must_use]
    pub const fn as_latest(mut self) -> Self {
        self.make_latest = true;
        self
    }
}

/// Validated target resolved before the write transaction opens.
struct ResolvedTarget {
    registry: RegistryName,
    name: EntryName,
    version: EntryVersion,
    title: Option<String>,
    description: Option<String>,
    make_latest: bool,
}

impl ResolvedTarget {
    fn open_entry(
        self,
        tx: &mut dyn CatalogTransaction,
        entry_type: EntryType,
        clock: &impl Clock,
    ) -> CatalogAdminResult<(Registry, RegistryEntry, bool)> {
        let registry = tx.get_registry_by_name(&self.registry)?;
        if !registry.is_protected() {
            return Err(CatalogStoreError::protected(format!(
                "registry {} is managed by configuration",
                registry.name()
            ))
            .into());
        }
        let entry = RegistryEntry::new(
            NewEntryParams {
                reg_id: registry.id(),
                entry_type,
                name: self.name,
                version: self.version,
                title: self.title,
                description: self.description,
                creation_type: CreationType::Api,
            },
            clock,
        );
        tx.insert_registry_entry(&entry)?;
        Ok((registry, entry, self.make_latest))
    }
}

fn latest_pointer(registry: &Registry, entry: &RegistryEntry) -> LatestVersionPointer {
    LatestVersionPointer::new(
        registry.id(),
        entry.name().clone(),
        entry.version().clone(),
        entry.id(),
    )
}

fn ensure_blob_within(
    field: &'static str,
    blob: Option<&MetadataBlob>,
    limit: usize,
) -> Result<(), CatalogDomainError> {
    match blob {
        Some(value) if value.len() > limit => Err(CatalogDomainError::MetadataTooLarge {
            field,
            size: value.len(),
            limit,
        }),
        _ => Ok(()),
    }
}

/// Service creating `API`-owned registries and publishing versions.
#[derive(Clone)]
pub struct CatalogAdminService<S, C>
where
    S: CatalogStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    clock: Arc<C>,
    max_metadata_bytes: usize,
}

impl<S, C> CatalogAdminService<S, C>
where
    S: CatalogStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a publishing service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>, config: &CatalogConfig) -> Self {
        Self {
            store,
            clock,
            max_metadata_bytes: config.max_metadata_bytes,
        }
    }

    /// Creates an `API`-owned registry. It is never synced.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogAdminError::Domain`] for an invalid name and a
    /// conflict store error when the name is taken.
    pub async fn create_registry(
        &self,
        request: CreateRegistryRequest,
    ) -> CatalogAdminResult<Registry> {
        let name = RegistryName::new(request.name)?;
        let registry =
            Registry::new(name, request.reg_type, CreationType::Api, &*self.clock).with_syncable(false);
        let record = registry.clone();
        self.store
            .write(move |tx| tx.insert_registry(&record).map_err(CatalogAdminError::from))
            .await?;
        info!(registry = %registry.name(), reg_type = %registry.reg_type(), "registry created");
        Ok(registry)
    }

    fn resolve_target(
        target: PublishTarget,
        name: EntryName,
    ) -> CatalogAdminResult<ResolvedTarget> {
        Ok(ResolvedTarget {
            registry: RegistryName::new(target.registry)?,
            name,
            version: EntryVersion::new(target.version)?,
            title: target.title,
            description: target.description,
            make_latest: target.make_latest,
        })
    }

    /// Publishes a server version with its packages, remotes and icons.
    ///
    /// The name must be in reverse-DNS `namespace/name` form. Everything,
    /// including the optional latest promotion, commits atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogAdminError::Domain`] for invalid names, versions or
    /// oversized metadata, a not-found store error for an unknown registry,
    /// a protected store error for a registry not created through the API,
    /// and a conflict store error when the version already exists.
    pub async fn publish_server(
        &self,
        target: PublishTarget,
        payload: ServerPayload,
    ) -> CatalogAdminResult<ServerVersionDetail> {
        let server_name = ServerName::parse(&target.name)?;
        let resolved = Self::resolve_target(target, server_name.into_entry_name())?;
        ensure_blob_within(
            "upstream_meta",
            payload.details.upstream_meta.as_ref(),
            self.max_metadata_bytes,
        )?;
        ensure_blob_within(
            "server_meta",
            payload.details.server_meta.as_ref(),
            self.max_metadata_bytes,
        )?;

        let clock = Arc::clone(&self.clock);
        let detail = self
            .store
            .write(move |tx| -> CatalogAdminResult<ServerVersionDetail> {
                let (registry, entry, make_latest) =
                    resolved.open_entry(tx, EntryType::Mcp, clock.as_ref())?;
                tx.insert_server_version(entry.id(), &payload.details)?;
                for package in &payload.packages {
                    tx.insert_server_package(entry.id(), package)?;
                }
                for remote in &payload.remotes {
                    tx.insert_server_remote(entry.id(), remote)?;
                }
                for icon in &payload.icons {
                    tx.insert_server_icon(entry.id(), icon)?;
                }
                if make_latest {
                    tx.upsert_latest_server_version(&latest_pointer(&registry, &entry))?;
                }

                let stored = tx.get_server_version(
                    entry.name(),
                    &VersionRef::Exact(entry.version().clone()),
                    Some(registry.name()),
                )?;
                let mut hydrated = hydrate_servers(tx, vec![stored])?;
                hydrated.pop().ok_or_else(|| {
                    CatalogStoreError::not_found(format!(
                        "server {}@{}",
                        entry.name(),
                        entry.version()
                    ))
                    .into()
                })
            })
            .await?;

        info!(
            registry = %detail.version.registry_name,
            name = %detail.version.entry.name(),
            version = %detail.version.entry.version(),
            latest = detail.version.is_latest,
            "server version published"
        );
        Ok(detail)
    }

    /// Publishes a skill version with its git and OCI packages.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogAdminError::Domain`] for invalid names, versions or
    /// oversized metadata, a not-found store error for an unknown registry,
    /// a protected store error for a registry not created through the API,
    /// and a conflict store error when the version already exists.
    pub async fn publish_skill(
        &self,
        target: PublishTarget,
        payload: SkillPayload,
    ) -> CatalogAdminResult<SkillVersionDetail> {
        let skill_name = EntryName::new(target.name.as_str())?;
        let resolved = Self::resolve_target(target, skill_name)?;
        for (field, blob) in [
            ("repository", payload.details.repository.as_ref()),
            ("icons", payload.details.icons.as_ref()),
            ("metadata", payload.details.metadata.as_ref()),
        ] {
            ensure_blob_within(field, blob, self.max_metadata_bytes)?;
        }

        let clock = Arc::clone(&self.clock);
        let detail = self
            .store
            .write(move |tx| -> CatalogAdminResult<SkillVersionDetail> {
                let (registry, entry, make_latest) =
                    resolved.open_entry(tx, EntryType::Skill, clock.as_ref())?;
                tx.insert_skill_version(entry.id(), &payload.details)?;
                for package in &payload.git_packages {
                    tx.insert_skill_git_package(entry.id(), package)?;
                }
                for package in &payload.oci_packages {
                    tx.insert_skill_oci_package(entry.id(), package)?;
                }
                if make_latest {
                    tx.upsert_latest_skill_version(&latest_pointer(&registry, &entry))?;
                }

                let stored = tx.get_skill_version(
                    entry.name(),
                    &VersionRef::Exact(entry.version().clone()),
                    Some(registry.name()),
                )?;
                let mut hydrated = hydrate_skills(tx, vec![stored])?;
                hydrated.pop().ok_or_else(|| {
                    CatalogStoreError::not_found(format!(
                        "skill {}@{}",
                        entry.name(),
                        entry.version()
                    ))
                    .into()
                })
            })
            .await?;

        info!(
            registry = %detail.version.registry_name,
            name = %detail.version.entry.name(),
            version = %detail.version.entry.version(),
            latest = detail.version.is_latest,
            "skill version published"
        );
        Ok(detail)
    }
}
