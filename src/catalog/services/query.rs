//! Read-side catalog queries with keyset pagination.

use super::hydrate::{hydrate_servers, hydrate_skills};
use crate::catalog::{
    config::CatalogConfig,
    domain::{
        CatalogDomainError, EntryKey, EntryListFilter, EntryName, Page, PageParams, PageRequest,
        Registry, RegistryEntry, RegistryId, RegistryKey, RegistryName, RegistrySync,
        ServerVersionDetail, SkillVersionDetail, VersionRef,
    },
    ports::{CatalogStore, CatalogStoreError},
};
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for catalog queries.
#[derive(Debug, Clone, Error)]
pub enum CatalogQueryError {
    /// A name, version, filter or cursor failed validation.
    #[error(transparent)]
    Domain(#[from] CatalogDomainError),
    /// Storage rejected the read or found nothing.
    #[error(transparent)]
    Store(#[from] CatalogStoreError),
}

impl CatalogQueryError {
    /// Returns whether the error is a missing record.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }
}

/// Result type for catalog queries.
pub type CatalogQueryResult<T> = Result<T, CatalogQueryError>;

/// Caller-facing filter for entry listings, validated on use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    /// Restrict to one registry by name.
    pub registry: Option<String>,
    /// Case-insensitive substring over name, title and description.
    pub search: Option<String>,
    /// Only versions designated latest.
    pub latest_only: bool,
}

impl EntryQuery {
    /// Restricts the listing to one registry.
    #[must_use]
    pub fn in_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Filters by a search term.
    #[must_use]
    pub fn matching(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Keeps only latest versions.
    #[must_use]
    pub const fn latest_only(mut self) -> Self {
        self.latest_only = true;
        self
    }

    fn into_filter(self, name: Option<EntryName>) -> CatalogQueryResult<EntryListFilter> {
        Ok(EntryListFilter {
            registry: self.registry.map(RegistryName::new).transpose()?,
            name,
            search: self.search,
            latest_only: self.latest_only,
        })
    }
}

/// Catalog read service.
///
/// List operations hydrate child collections for the whole page in batched
/// reads inside the same read-only transaction.
#[derive(Clone)]
pub struct CatalogQueryService<S>
where
    S: CatalogStore + 'static,
{
    store: Arc<S>,
    default_page_size: usize,
    max_page_size: usize,
}

impl<S> CatalogQueryService<S>
where
    S: CatalogStore + 'static,
{
    /// Creates a query service using the configured page sizes.
    #[must_use]
    pub const fn new(store: Arc<S>, config: &CatalogConfig) -> Self {
        Self {
            store,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    fn resolve<K: serde::de::DeserializeOwned>(
        &self,
        params: &PageParams,
    ) -> CatalogQueryResult<PageRequest<K>> {
        Ok(params.resolve(self.default_page_size, self.max_page_size)?)
    }

    /// Lists registries in `(created_at, name)` order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogQueryError::Domain`] for invalid page parameters, or
    /// storage failures.
    pub async fn list_registries(&self, params: &PageParams) -> CatalogQueryResult<Page<Registry>> {
        let request: PageRequest<RegistryKey> = self.resolve(params)?;
        let registries = self
            .store
            .read(move |tx| tx.list_registries(&request).map_err(CatalogQueryError::from))
            .await?;
        Ok(Page::from_items(registries, |registry| RegistryKey {
            created_at: registry.created_at(),
            name: registry.name().clone(),
        })?)
    }

    /// Loads a registry by identifier.
    ///
    /// # Errors
    ///
    /// Returns a not-found store error when absent.
    pub async fn get_registry(&self, id: RegistryId) -> CatalogQueryResult<Registry> {
        self.store
            .read(move |tx| tx.get_registry(id).map_err(CatalogQueryError::from))
            .await
    }

    /// Loads a registry by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogQueryError::Domain`] for an invalid name and a
    /// not-found store error when absent.
    pub async fn get_registry_by_name(&self, name: &str) -> CatalogQueryResult<Registry> {
        let registry_name = RegistryName::new(name)?;
        self.store
            .read(move |tx| {
                tx.get_registry_by_name(&registry_name)
                    .map_err(CatalogQueryError::from)
            })
            .await
    }

    /// Lists sync runs of a registry, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogQueryError::Domain`] for an invalid name and a
    /// not-found store error when the registry is absent.
    pub async fn list_registry_syncs(
        &self,
        registry: &str,
        limit: usize,
    ) -> CatalogQueryResult<Vec<RegistrySync>> {
        let registry_name = RegistryName::new(registry)?;
        self.store
            .read(move |tx| {
                let found = tx.get_registry_by_name(&registry_name)?;
                Ok(tx.list_registry_syncs(found.id(), limit)?)
            })
            .await
    }

    /// Lists server versions in `(name, version, id)` order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogQueryError::Domain`] for invalid filters or page
    /// parameters, or storage failures.
    pub async fn list_servers(
        &self,
        query: EntryQuery,
        params: &PageParams,
    ) -> CatalogQueryResult<Page<ServerVersionDetail>> {
        let filter = query.into_filter(None)?;
        self.server_page(filter, params).await
    }

    /// Lists every version of one server name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogQueryError::Domain`] for an invalid name, filter or
    /// page parameters, or storage failures.
    pub async fn list_server_versions(
        &self,
        name: &str,
        query: EntryQuery,
        params: &PageParams,
    ) -> CatalogQueryResult<Page<ServerVersionDetail>> {
        let filter = query.into_filter(Some(EntryName::new(name)?))?;
        self.server_page(filter, params).await
    }

    async fn server_page(
        &self,
        filter: EntryListFilter,
        params: &PageParams,
    ) -> CatalogQueryResult<Page<ServerVersionDetail>> {
        let request: PageRequest<EntryKey> = self.resolve(params)?;
        let details = self
            .store
            .read(move |tx| {
                let versions = tx.list_servers(&filter, &request)?;
                Ok::<_, CatalogQueryError>(hydrate_servers(tx, versions)?)
            })
            .await?;
        Ok(Page::from_items(details, |detail| {
            entry_key(&detail.version.entry)
        })?)
    }

    /// Loads one server version; `version` may be `latest`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogQueryError::Domain`] for an invalid name, version
    /// or registry, and a not-found store error when nothing matches.
    pub async fn get_server_version(
        &self,
        name: &str,
        version: &str,
        registry: Option<&str>,
    ) -> CatalogQueryResult<ServerVersionDetail> {
        let (entry_name, selector, registry_name) = lookup_parts(name, version, registry)?;
        self.store
            .read(move |tx| {
                let found =
                    tx.get_server_version(&entry_name, &selector, registry_name.as_ref())?;
                let mut hydrated = hydrate_servers(tx, vec![found])?;
                hydrated.pop().ok_or_else(|| {
                    CatalogStoreError::not_found(format!("server {entry_name}@{selector}")).into()
                })
            })
            .await
    }

    /// Lists skill versions in `(name, version, id)` order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogQueryError::Domain`] for invalid filters or page
    /// parameters, or storage failures.
    pub async fn list_skills(
        &self,
        query: EntryQuery,
        params: &PageParams,
    ) -> CatalogQueryResult<Page<SkillVersionDetail>> {
        let filter = query.into_filter(None)?;
        let request: PageRequest<EntryKey> = self.resolve(params)?;
        let details = self
            .store
            .read(move |tx| {
                let versions = tx.list_skills(&filter, &request)?;
                Ok::<_, CatalogQueryError>(hydrate_skills(tx, versions)?)
            })
            .await?;
        Ok(Page::from_items(details, |detail| {
            entry_key(&detail.version.entry)
        })?)
    }

    /// Loads one skill version; `version` may be `latest`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogQueryError::Domain`] for an invalid name, version
    /// or registry, and a not-found store error when nothing matches.
    pub async fn get_skill_version(
        &self,
        name: &str,
        version: &str,
        registry: Option<&str>,
    ) -> CatalogQueryResult<SkillVersionDetail> {
        let (entry_name, selector, registry_name) = lookup_parts(name, version, registry)?;
        self.store
            .read(move |tx| {
                let found = tx.get_skill_version(&entry_name, &selector, registry_name.as_ref())?;
                let mut hydrated = hydrate_skills(tx, vec![found])?;
                hydrated.pop().ok_or_else(|| {
                    CatalogStoreError::not_found(format!("skill {entry_name}@{selector}")).into()
                })
            })
            .await
    }
}

fn entry_key(entry: &RegistryEntry) -> EntryKey {
    EntryKey {
        name: entry.name().clone(),
        version: entry.version().clone(),
        id: entry.id(),
    }
}

fn lookup_parts(
    name: &str,
    version: &str,
    registry: Option<&str>,
) -> CatalogQueryResult<(EntryName, VersionRef, Option<RegistryName>)> {
    Ok((
        EntryName::new(name)?,
        VersionRef::parse(version)?,
        registry.map(RegistryName::new).transpose()?,
    ))
}
