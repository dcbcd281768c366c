//! In-memory catalog store.

use crate::catalog::{
    domain::{
        CreationType, EntryId, EntryKey, EntryListFilter, EntryName, EntryType, EntryVersion,
        IconTheme, LatestVersionPointer, PageRequest, PersistedRegistryData, Registry,
        RegistryEntry, RegistryId, RegistryKey, RegistryName, RegistrySync, RegistryUpsert,
        ServerDetails, ServerIcon, ServerPackage, ServerRemote, ServerVersion, SkillDetails,
        SkillGitPackage, SkillOciPackage, SkillVersion, SyncCompletion, SyncId, SyncStatus,
        VersionRef,
    },
    ports::{CatalogStore, CatalogStoreError, CatalogStoreResult, CatalogTransaction},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory catalog store.
///
/// Reads borrow the shared state under the read lock. Write transactions
/// run against a working copy that replaces the shared state only when the
/// work succeeds, so a failed or cancelled transaction leaves no trace. The
/// copy shares every table with the committed state and clones a table the
/// first time the transaction changes it. Uniqueness, referential and
/// cascade rules mirror the relational schema.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogStore {
    state: Arc<RwLock<CatalogState>>,
}

/// Copy-on-write table handle.
#[derive(Debug, Default)]
struct Table<T>(Arc<T>);

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for Table<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Clone> DerefMut for Table<T> {
    fn deref_mut(&mut self) -> &mut T {
        Arc::make_mut(&mut self.0)
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogState {
    registries: Table<HashMap<RegistryId, Registry>>,
    entries: Table<HashMap<EntryId, RegistryEntry>>,
    server_versions: Table<HashMap<EntryId, ServerDetails>>,
    skill_versions: Table<HashMap<EntryId, SkillDetails>>,
    server_packages: Table<Vec<(EntryId, ServerPackage)>>,
    server_remotes: Table<Vec<(EntryId, ServerRemote)>>,
    server_icons: Table<BTreeMap<(EntryId, IconTheme), ServerIcon>>,
    skill_git_packages: Table<Vec<(EntryId, SkillGitPackage)>>,
    skill_oci_packages: Table<Vec<(EntryId, SkillOciPackage)>>,
    latest_servers: Table<HashMap<(RegistryId, EntryName), LatestVersionPointer>>,
    latest_skills: Table<HashMap<(RegistryId, EntryName), LatestVersionPointer>>,
    syncs: Table<Vec<RegistrySync>>,
}

impl InMemoryCatalogStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl std::fmt::Display) -> CatalogStoreError {
    CatalogStoreError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn write<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut dyn CatalogTransaction) -> Result<T, E> + Send + 'static,
    {
        let mut guard = self.state.write().map_err(lock_error)?;
        let mut working = guard.clone();
        let output = work(&mut InMemoryTransaction::read_write(&mut working))?;
        *guard = working;
        Ok(output)
    }

    async fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<CatalogStoreError> + Send + 'static,
        F: FnOnce(&mut dyn CatalogTransaction) -> Result<T, E> + Send + 'static,
    {
        let guard = self.state.read().map_err(lock_error)?;
        work(&mut InMemoryTransaction::read_only(&guard))
    }
}

enum StateAccess<'state> {
    Shared(&'state CatalogState),
    Exclusive(&'state mut CatalogState),
}

impl Deref for StateAccess<'_> {
    type Target = CatalogState;

    fn deref(&self) -> &CatalogState {
        match self {
            Self::Shared(state) => state,
            Self::Exclusive(state) => state,
        }
    }
}

struct InMemoryTransaction<'state> {
    state: StateAccess<'state>,
}

impl<'state> InMemoryTransaction<'state> {
    const fn read_write(state: &'state mut CatalogState) -> Self {
        Self {
            state: StateAccess::Exclusive(state),
        }
    }

    const fn read_only(state: &'state CatalogState) -> Self {
        Self {
            state: StateAccess::Shared(state),
        }
    }

    fn state_mut(&mut self) -> CatalogStoreResult<&mut CatalogState> {
        match &mut self.state {
            StateAccess::Exclusive(state) => Ok(&mut **state),
            StateAccess::Shared(_) => Err(CatalogStoreError::invalid(
                "cannot write inside a read-only transaction",
            )),
        }
    }
}

impl CatalogState {
    fn registries_in_order(&self) -> Vec<&Registry> {
        let mut registries: Vec<&Registry> = self.registries.values().collect();
        registries.sort_by_key(|registry| registry_key(registry));
        registries
    }

    fn registry_by_name(&self, name: &RegistryName) -> Option<&Registry> {
        self.registries
            .values()
            .find(|registry| registry.name() == name)
    }

    fn entry_for_version_row(
        &self,
        entry_id: EntryId,
        expected: EntryType,
    ) -> CatalogStoreResult<&RegistryEntry> {
        let entry = self
            .entries
            .get(&entry_id)
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry entry {entry_id}")))?;
        if entry.entry_type() != expected {
            return Err(CatalogStoreError::invalid(format!(
                "entry {entry_id} is {} and cannot hold a {expected} version",
                entry.entry_type()
            )));
        }
        Ok(entry)
    }

    fn ensure_sync_owned(&self, entry_id: EntryId, expected: EntryType) -> CatalogStoreResult<()> {
        let entry = self.entry_for_version_row(entry_id, expected)?;
        if entry.is_protected() {
            return Err(CatalogStoreError::protected(format!(
                "entry {}@{} is API-owned",
                entry.name(),
                entry.version()
            )));
        }
        Ok(())
    }

    fn ensure_server_version(&self, entry_id: EntryId) -> CatalogStoreResult<()> {
        if self.server_versions.contains_key(&entry_id) {
            Ok(())
        } else {
            Err(CatalogStoreError::not_found(format!(
                "server version {entry_id}"
            )))
        }
    }

    fn ensure_skill_version(&self, entry_id: EntryId) -> CatalogStoreResult<()> {
        if self.skill_versions.contains_key(&entry_id) {
            Ok(())
        } else {
            Err(CatalogStoreError::not_found(format!("skill version {entry_id}")))
        }
    }

    fn remove_entry(&mut self, entry_id: EntryId) {
        self.entries.remove(&entry_id);
        self.server_versions.remove(&entry_id);
        self.skill_versions.remove(&entry_id);
        self.remove_server_children(entry_id);
        self.remove_skill_packages(entry_id);
        self.latest_servers
            .retain(|_, pointer| pointer.entry_id != entry_id);
        self.latest_skills
            .retain(|_, pointer| pointer.entry_id != entry_id);
    }

    fn remove_server_children(&mut self, entry_id: EntryId) {
        self.server_packages.retain(|(owner, _)| *owner != entry_id);
        self.server_remotes.retain(|(owner, _)| *owner != entry_id);
        self.server_icons.retain(|(owner, _), _| *owner != entry_id);
    }

    fn remove_skill_packages(&mut self, entry_id: EntryId) {
        self.skill_git_packages
            .retain(|(owner, _)| *owner != entry_id);
        self.skill_oci_packages
            .retain(|(owner, _)| *owner != entry_id);
    }

    fn remove_registry(&mut self, reg_id: RegistryId) {
        let owned: Vec<EntryId> = self
            .entries
            .values()
            .filter(|entry| entry.reg_id() == reg_id)
            .map(RegistryEntry::id)
            .collect();
        for entry_id in owned {
            self.remove_entry(entry_id);
        }
        self.latest_servers.retain(|(owner, _), _| *owner != reg_id);
        self.latest_skills.retain(|(owner, _), _| *owner != reg_id);
        self.syncs.retain(|sync| sync.reg_id() != reg_id);
        self.registries.remove(&reg_id);
    }

    fn delete_orphans(
        &mut self,
        reg_id: RegistryId,
        entry_type: EntryType,
        keep: &[EntryId],
    ) -> u64 {
        let kept: HashSet<&EntryId> = keep.iter().collect();
        let orphans: Vec<EntryId> = self
            .entries
            .values()
            .filter(|entry| {
                entry.reg_id() == reg_id
                    && entry.entry_type() == entry_type
                    && entry.creation_type() == CreationType::Config
                    && !kept.contains(&entry.id())
            })
            .map(RegistryEntry::id)
            .collect();
        for entry_id in &orphans {
            self.remove_entry(*entry_id);
        }
        u64::try_from(orphans.len()).unwrap_or(u64::MAX)
    }

    fn check_pointer_target(
        &self,
        pointer: &LatestVersionPointer,
        entry_type: EntryType,
    ) -> CatalogStoreResult<()> {
        if !self.registries.contains_key(&pointer.reg_id) {
            return Err(CatalogStoreError::not_found(format!(
                "registry {}",
                pointer.reg_id
            )));
        }
        match entry_type {
            EntryType::Mcp => self.ensure_server_version(pointer.entry_id),
            EntryType::Skill => self.ensure_skill_version(pointer.entry_id),
        }
    }

    fn latest_pointers(
        &self,
        entry_type: EntryType,
    ) -> &HashMap<(RegistryId, EntryName), LatestVersionPointer> {
        match entry_type {
            EntryType::Mcp => &self.latest_servers,
            EntryType::Skill => &self.latest_skills,
        }
    }

    fn is_latest(&self, entry: &RegistryEntry) -> bool {
        self.latest_pointers(entry.entry_type())
            .get(&(entry.reg_id(), entry.name().clone()))
            .is_some_and(|pointer| pointer.entry_id == entry.id())
    }

    fn has_version_row(&self, entry: &RegistryEntry) -> bool {
        match entry.entry_type() {
            EntryType::Mcp => self.server_versions.contains_key(&entry.id()),
            EntryType::Skill => self.skill_versions.contains_key(&entry.id()),
        }
    }

    fn resolve_entry(
        &self,
        entry_type: EntryType,
        name: &EntryName,
        version: &VersionRef,
        registry: Option<&RegistryName>,
    ) -> CatalogStoreResult<&RegistryEntry> {
        let candidates: Vec<&Registry> = match registry {
            Some(registry_name) => vec![self.registry_by_name(registry_name).ok_or_else(|| {
                CatalogStoreError::not_found(format!("registry {registry_name}"))
            })?],
            None => self.registries_in_order(),
        };

        candidates
            .into_iter()
            .find_map(|registry_row| {
                let found = match version {
                    VersionRef::Latest => self
                        .latest_pointers(entry_type)
                        .get(&(registry_row.id(), name.clone()))
                        .and_then(|pointer| self.entries.get(&pointer.entry_id)),
                    VersionRef::Exact(exact) => self.entries.values().find(|entry| {
                        entry.reg_id() == registry_row.id()
                            && entry.entry_type() == entry_type
                            && entry.name() == name
                            && entry.version() == exact
                    }),
                };
                found.filter(|entry| self.has_version_row(entry))
            })
            .ok_or_else(|| {
                CatalogStoreError::not_found(format!("{entry_type} entry {name}@{version}"))
            })
    }

    fn registry_name_of(&self, entry: &RegistryEntry) -> CatalogStoreResult<RegistryName> {
        self.registries
            .get(&entry.reg_id())
            .map(|registry| registry.name().clone())
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry {}", entry.reg_id())))
    }

    fn server_version(&self, entry: &RegistryEntry) -> CatalogStoreResult<ServerVersion> {
        let details = self
            .server_versions
            .get(&entry.id())
            .cloned()
            .ok_or_else(|| CatalogStoreError::not_found(format!("server version {}", entry.id())))?;
        Ok(ServerVersion {
            entry: entry.clone(),
            registry_name: self.registry_name_of(entry)?,
            details,
            is_latest: self.is_latest(entry),
        })
    }

    fn skill_version(&self, entry: &RegistryEntry) -> CatalogStoreResult<SkillVersion> {
        let details = self
            .skill_versions
            .get(&entry.id())
            .cloned()
            .ok_or_else(|| CatalogStoreError::not_found(format!("skill version {}", entry.id())))?;
        Ok(SkillVersion {
            entry: entry.clone(),
            registry_name: self.registry_name_of(entry)?,
            details,
            is_latest: self.is_latest(entry),
        })
    }

    fn filtered_entries(
        &self,
        entry_type: EntryType,
        filter: &EntryListFilter,
        page: &PageRequest<EntryKey>,
    ) -> Vec<&RegistryEntry> {
        let registry_id = filter
            .registry
            .as_ref()
            .map(|name| self.registry_by_name(name).map(Registry::id));
        let search = filter.search_term();

        let mut matching: Vec<&RegistryEntry> = self
            .entries
            .values()
            .filter(|entry| entry.entry_type() == entry_type && self.has_version_row(entry))
            .filter(|entry| registry_id.is_none_or(|id| id == Some(entry.reg_id())))
            .filter(|entry| filter.name.as_ref().is_none_or(|name| entry.name() == name))
            .filter(|entry| search.is_none_or(|term| entry.matches_search(term)))
            .filter(|entry| !filter.latest_only || self.is_latest(entry))
            .collect();
        matching.sort_by_key(|entry| entry_key(entry));
        page.select(matching, |entry| entry_key(entry))
    }

    fn find_sync_mut(&mut self, sync_id: SyncId) -> CatalogStoreResult<&mut RegistrySync> {
        self.syncs
            .iter_mut()
            .find(|sync| sync.id() == sync_id)
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry sync {sync_id}")))
    }

    fn syncs_newest_first(&self, reg_id: RegistryId) -> Vec<&RegistrySync> {
        let mut syncs: Vec<&RegistrySync> = self
            .syncs
            .iter()
            .filter(|sync| sync.reg_id() == reg_id)
            .collect();
        syncs.sort_by(|left, right| {
            right
                .started_at()
                .cmp(&left.started_at())
                .then_with(|| right.id().cmp(&left.id()))
        });
        syncs
    }
}

fn registry_key(registry: &Registry) -> RegistryKey {
    RegistryKey {
        created_at: registry.created_at(),
        name: registry.name().clone(),
    }
}

fn entry_key(entry: &RegistryEntry) -> EntryKey {
    EntryKey {
        name: entry.name().clone(),
        version: entry.version().clone(),
        id: entry.id(),
    }
}

fn children_of<T: Clone>(rows: &[(EntryId, T)], entry_ids: &[EntryId]) -> Vec<(EntryId, T)> {
    let wanted: HashSet<&EntryId> = entry_ids.iter().collect();
    rows.iter()
        .filter(|(owner, _)| wanted.contains(owner))
        .cloned()
        .collect()
}

impl CatalogTransaction for InMemoryTransaction<'_> {
    fn insert_registry(&mut self, registry: &Registry) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        if state.registries.contains_key(&registry.id())
            || state.registry_by_name(registry.name()).is_some()
        {
            return Err(CatalogStoreError::conflict(format!(
                "registry {} already exists",
                registry.name()
            )));
        }
        state.registries.insert(registry.id(), registry.clone());
        Ok(())
    }

    fn bulk_upsert_registries(
        &mut self,
        rows: &[RegistryUpsert],
    ) -> CatalogStoreResult<Vec<Registry>> {
        let state = self.state_mut()?;
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let existing = state.registry_by_name(&row.name).cloned();
            let stored = match existing {
                Some(current) if current.is_protected() => continue,
                Some(current) => Registry::from_persisted(PersistedRegistryData {
                    id: current.id(),
                    name: current.name().clone(),
                    reg_type: row.reg_type,
                    creation_type: current.creation_type(),
                    syncable: row.syncable,
                    created_at: current.created_at(),
                    updated_at: row.timestamp,
                }),
                None => Registry::from_persisted(PersistedRegistryData {
                    id: row.id,
                    name: row.name.clone(),
                    reg_type: row.reg_type,
                    creation_type: row.creation_type,
                    syncable: row.syncable,
                    created_at: row.timestamp,
                    updated_at: row.timestamp,
                }),
            };
            state.registries.insert(stored.id(), stored.clone());
            written.push(stored);
        }
        Ok(written)
    }

    fn delete_registries_not_in_list(&mut self, keep: &[RegistryId]) -> CatalogStoreResult<u64> {
        let state = self.state_mut()?;
        let doomed: Vec<RegistryId> = state
            .registries
            .values()
            .filter(|registry| {
                registry.creation_type() == CreationType::Config && !keep.contains(&registry.id())
            })
            .map(Registry::id)
            .collect();
        for reg_id in &doomed {
            state.remove_registry(*reg_id);
        }
        Ok(u64::try_from(doomed.len()).unwrap_or(u64::MAX))
    }

    fn get_api_registries_by_names(
        &mut self,
        names: &[RegistryName],
    ) -> CatalogStoreResult<Vec<RegistryName>> {
        Ok(names
            .iter()
            .filter(|name| {
                self.state
                    .registry_by_name(name)
                    .is_some_and(Registry::is_protected)
            })
            .cloned()
            .collect())
    }

    fn get_registry(&mut self, id: RegistryId) -> CatalogStoreResult<Registry> {
        self.state
            .registries
            .get(&id)
            .cloned()
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry {id}")))
    }

    fn get_registry_by_name(&mut self, name: &RegistryName) -> CatalogStoreResult<Registry> {
        self.state
            .registry_by_name(name)
            .cloned()
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry {name}")))
    }

    fn list_registries(
        &mut self,
        page: &PageRequest<RegistryKey>,
    ) -> CatalogStoreResult<Vec<Registry>> {
        let ordered = self.state.registries_in_order();
        Ok(page
            .select(ordered, |registry| registry_key(registry))
            .into_iter()
            .cloned()
            .collect())
    }

    fn list_syncable_registries(&mut self) -> CatalogStoreResult<Vec<Registry>> {
        Ok(self
            .state
            .registries_in_order()
            .into_iter()
            .filter(|registry| registry.is_syncable() && !registry.is_protected())
            .cloned()
            .collect())
    }

    fn insert_registry_entry(&mut self, entry: &RegistryEntry) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        if !state.registries.contains_key(&entry.reg_id()) {
            return Err(CatalogStoreError::not_found(format!(
                "registry {}",
                entry.reg_id()
            )));
        }
        let duplicate = state.entries.contains_key(&entry.id())
            || state.entries.values().any(|existing| {
                existing.reg_id() == entry.reg_id()
                    && existing.name() == entry.name()
                    && existing.version() == entry.version()
            });
        if duplicate {
            return Err(CatalogStoreError::conflict(format!(
                "entry {}@{} already exists",
                entry.name(),
                entry.version()
            )));
        }
        state.entries.insert(entry.id(), entry.clone());
        Ok(())
    }

    fn find_registry_entry(
        &mut self,
        reg_id: RegistryId,
        name: &EntryName,
        version: &EntryVersion,
    ) -> CatalogStoreResult<Option<RegistryEntry>> {
        Ok(self
            .state
            .entries
            .values()
            .find(|entry| {
                entry.reg_id() == reg_id && entry.name() == name && entry.version() == version
            })
            .cloned())
    }

    fn insert_server_version(
        &mut self,
        entry_id: EntryId,
        details: &ServerDetails,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.entry_for_version_row(entry_id, EntryType::Mcp)?;
        if state.server_versions.contains_key(&entry_id) {
            return Err(CatalogStoreError::conflict(format!(
                "server version {entry_id} already exists"
            )));
        }
        state.server_versions.insert(entry_id, details.clone());
        Ok(())
    }

    fn upsert_server_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &ServerDetails,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.ensure_sync_owned(entry_id, EntryType::Mcp)?;
        state.server_versions.insert(entry_id, details.clone());
        Ok(())
    }

    fn insert_skill_version(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.entry_for_version_row(entry_id, EntryType::Skill)?;
        if state.skill_versions.contains_key(&entry_id) {
            return Err(CatalogStoreError::conflict(format!(
                "skill version {entry_id} already exists"
            )));
        }
        state.skill_versions.insert(entry_id, details.clone());
        Ok(())
    }

    fn insert_skill_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()> {
        self.state_mut()?
            .ensure_sync_owned(entry_id, EntryType::Skill)?;
        self.insert_skill_version(entry_id, details)
    }

    fn upsert_skill_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.ensure_sync_owned(entry_id, EntryType::Skill)?;
        state.skill_versions.insert(entry_id, details.clone());
        Ok(())
    }

    fn insert_server_package(
        &mut self,
        entry_id: EntryId,
        package: &ServerPackage,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.ensure_server_version(entry_id)?;
        state.server_packages.push((entry_id, package.clone()));
        Ok(())
    }

    fn insert_server_remote(
        &mut self,
        entry_id: EntryId,
        remote: &ServerRemote,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.ensure_server_version(entry_id)?;
        let duplicate = state.server_remotes.iter().any(|(owner, existing)| {
            *owner == entry_id
                && existing.transport_type == remote.transport_type
                && existing.url == remote.url
        });
        if duplicate {
            return Err(CatalogStoreError::conflict(format!(
                "remote {} {} already exists for entry {entry_id}",
                remote.transport_type, remote.url
            )));
        }
        state.server_remotes.push((entry_id, remote.clone()));
        Ok(())
    }

    fn insert_server_icon(
        &mut self,
        entry_id: EntryId,
        icon: &ServerIcon,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.ensure_server_version(entry_id)?;
        state
            .server_icons
            .insert((entry_id, icon.theme), icon.clone());
        Ok(())
    }

    fn insert_skill_git_package(
        &mut self,
        entry_id: EntryId,
        package: &SkillGitPackage,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.ensure_skill_version(entry_id)?;
        state.skill_git_packages.push((entry_id, package.clone()));
        Ok(())
    }

    fn insert_skill_oci_package(
        &mut self,
        entry_id: EntryId,
        package: &SkillOciPackage,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.ensure_skill_version(entry_id)?;
        state.skill_oci_packages.push((entry_id, package.clone()));
        Ok(())
    }

    fn delete_server_children(&mut self, entry_id: EntryId) -> CatalogStoreResult<()> {
        self.state_mut()?.remove_server_children(entry_id);
        Ok(())
    }

    fn delete_skill_packages(&mut self, entry_id: EntryId) -> CatalogStoreResult<()> {
        self.state_mut()?.remove_skill_packages(entry_id);
        Ok(())
    }

    fn delete_orphaned_servers(
        &mut self,
        reg_id: RegistryId,
        keep: &[EntryId],
    ) -> CatalogStoreResult<u64> {
        Ok(self.state_mut()?.delete_orphans(reg_id, EntryType::Mcp, keep))
    }

    fn delete_orphaned_skills(
        &mut self,
        reg_id: RegistryId,
        keep: &[EntryId],
    ) -> CatalogStoreResult<u64> {
        Ok(self
            .state_mut()?
            .delete_orphans(reg_id, EntryType::Skill, keep))
    }

    fn upsert_latest_server_version(
        &mut self,
        pointer: &LatestVersionPointer,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.check_pointer_target(pointer, EntryType::Mcp)?;
        state
            .latest_servers
            .insert((pointer.reg_id, pointer.name.clone()), pointer.clone());
        Ok(())
    }

    fn upsert_latest_skill_version(
        &mut self,
        pointer: &LatestVersionPointer,
    ) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        state.check_pointer_target(pointer, EntryType::Skill)?;
        state
            .latest_skills
            .insert((pointer.reg_id, pointer.name.clone()), pointer.clone());
        Ok(())
    }

    fn get_server_version(
        &mut self,
        name: &EntryName,
        version: &VersionRef,
        registry: Option<&RegistryName>,
    ) -> CatalogStoreResult<ServerVersion> {
        let entry = self
            .state
            .resolve_entry(EntryType::Mcp, name, version, registry)?;
        self.state.server_version(entry)
    }

    fn get_skill_version(
        &mut self,
        name: &EntryName,
        version: &VersionRef,
        registry: Option<&RegistryName>,
    ) -> CatalogStoreResult<SkillVersion> {
        let entry = self
            .state
            .resolve_entry(EntryType::Skill, name, version, registry)?;
        self.state.skill_version(entry)
    }

    fn list_servers(
        &mut self,
        filter: &EntryListFilter,
        page: &PageRequest<EntryKey>,
    ) -> CatalogStoreResult<Vec<ServerVersion>> {
        self.state
            .filtered_entries(EntryType::Mcp, filter, page)
            .into_iter()
            .map(|entry| self.state.server_version(entry))
            .collect()
    }

    fn list_skills(
        &mut self,
        filter: &EntryListFilter,
        page: &PageRequest<EntryKey>,
    ) -> CatalogStoreResult<Vec<SkillVersion>> {
        self.state
            .filtered_entries(EntryType::Skill, filter, page)
            .into_iter()
            .map(|entry| self.state.skill_version(entry))
            .collect()
    }

    fn list_server_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerPackage)>> {
        Ok(children_of(self.state.server_packages.as_slice(), entry_ids))
    }

    fn list_server_remotes(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerRemote)>> {
        Ok(children_of(self.state.server_remotes.as_slice(), entry_ids))
    }

    fn list_server_icons(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerIcon)>> {
        let wanted: HashSet<&EntryId> = entry_ids.iter().collect();
        Ok(self
            .state
            .server_icons
            .iter()
            .filter(|((owner, _), _)| wanted.contains(owner))
            .map(|((owner, _), icon)| (*owner, icon.clone()))
            .collect())
    }

    fn list_skill_git_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, SkillGitPackage)>> {
        Ok(children_of(self.state.skill_git_packages.as_slice(), entry_ids))
    }

    fn list_skill_oci_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, SkillOciPackage)>> {
        Ok(children_of(self.state.skill_oci_packages.as_slice(), entry_ids))
    }

    fn insert_registry_sync(&mut self, sync: &RegistrySync) -> CatalogStoreResult<()> {
        let state = self.state_mut()?;
        if !state.registries.contains_key(&sync.reg_id()) {
            return Err(CatalogStoreError::not_found(format!(
                "registry {}",
                sync.reg_id()
            )));
        }
        if state.syncs.iter().any(|existing| existing.id() == sync.id()) {
            return Err(CatalogStoreError::conflict(format!(
                "registry sync {} already exists",
                sync.id()
            )));
        }
        state.syncs.push(sync.clone());
        Ok(())
    }

    fn finish_registry_sync(
        &mut self,
        sync_id: SyncId,
        completion: &SyncCompletion,
        ended_at: DateTime<Utc>,
    ) -> CatalogStoreResult<RegistrySync> {
        let sync = self.state_mut()?.find_sync_mut(sync_id)?;
        sync.finish(completion, ended_at).map_err(|err| {
            CatalogStoreError::conflict(format!("registry sync {sync_id}: {err}"))
        })?;
        Ok(sync.clone())
    }

    fn get_latest_registry_sync(
        &mut self,
        reg_id: RegistryId,
    ) -> CatalogStoreResult<Option<RegistrySync>> {
        Ok(self
            .state
            .syncs_newest_first(reg_id)
            .first()
            .map(|sync| (*sync).clone()))
    }

    fn list_registry_syncs(
        &mut self,
        reg_id: RegistryId,
        limit: usize,
    ) -> CatalogStoreResult<Vec<RegistrySync>> {
        Ok(self
            .state
            .syncs_newest_first(reg_id)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn fail_stale_registry_syncs(
        &mut self,
        cutoff: DateTime<Utc>,
        error_msg: &str,
        ended_at: DateTime<Utc>,
    ) -> CatalogStoreResult<Vec<RegistrySync>> {
        let state = self.state_mut()?;
        let completion = SyncCompletion::Failed(error_msg.to_owned());
        let mut swept = Vec::new();
        let syncs: &mut Vec<RegistrySync> = &mut state.syncs;
        for sync in syncs {
            if sync.status() == SyncStatus::InProgress && sync.started_at() <= cutoff {
                sync.finish(&completion, ended_at)
                    .map_err(CatalogStoreError::invalid_persisted_data)?;
                swept.push(sync.clone());
            }
        }
        Ok(swept)
    }
}
