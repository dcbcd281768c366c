//! Diesel implementation of the catalog transaction contract.

use super::models::{
    EntryRow, RegistryRow, RegistrySyncRow, ServerIconRow, ServerPackageRow, ServerRemoteRow,
    ServerVersionRow, SkillGitPackageRow, SkillOciPackageRow, SkillVersionRow, row_to_entry,
    row_to_registry, row_to_server_details, row_to_server_icon, row_to_server_package,
    row_to_server_remote, row_to_skill_details, row_to_skill_git, row_to_skill_oci, row_to_sync,
    to_entry_row, to_latest_server_row, to_latest_skill_row, to_registry_row,
    to_server_icon_row, to_server_package_row, to_server_remote_row, to_server_version_row,
    to_skill_git_row, to_skill_oci_row, to_skill_version_row, to_sync_row,
};
use super::schema::{
    latest_server_versions, latest_skill_versions, registries, registry_entries, registry_syncs,
    server_icons, server_packages, server_remotes, server_versions, skill_git_packages,
    skill_oci_packages, skill_versions,
};
use crate::catalog::{
    domain::{
        CreationType, EntryId, EntryKey, EntryListFilter, EntryName, EntryType, EntryVersion,
        LatestVersionPointer, PageCursor, PageRequest, Registry, RegistryEntry, RegistryId,
        RegistryKey, RegistryName, RegistrySync, RegistryUpsert, ServerDetails, ServerIcon,
        ServerPackage, ServerRemote, ServerVersion, SkillDetails, SkillGitPackage,
        SkillOciPackage, SkillVersion, SyncCompletion, SyncId, SyncStatus, VersionRef,
    },
    ports::{CatalogStoreError, CatalogStoreResult, CatalogTransaction},
};
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};
use diesel::upsert::excluded;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Catalog transaction bound to one open database transaction.
pub(super) struct PgCatalogTransaction<'conn> {
    conn: &'conn mut PgConnection,
}

impl<'conn> PgCatalogTransaction<'conn> {
    pub(super) const fn new(conn: &'conn mut PgConnection) -> Self {
        Self { conn }
    }

    fn load_entry(&mut self, entry_id: EntryId) -> CatalogStoreResult<Option<RegistryEntry>> {
        registry_entries::table
            .find(entry_id.into_inner())
            .select(EntryRow::as_select())
            .first::<EntryRow>(self.conn)
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_entry)
            .transpose()
    }

    fn entry_for_version_row(
        &mut self,
        entry_id: EntryId,
        expected: EntryType,
    ) -> CatalogStoreResult<RegistryEntry> {
        let entry = self
            .load_entry(entry_id)?
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry entry {entry_id}")))?;
        if entry.entry_type() != expected {
            return Err(CatalogStoreError::invalid(format!(
                "entry {entry_id} is {} and cannot hold a {expected} version",
                entry.entry_type()
            )));
        }
        Ok(entry)
    }

    fn ensure_sync_owned(&mut self, entry_id: EntryId, expected: EntryType) -> CatalogStoreResult<()> {
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

    fn select_entries(
        &mut self,
        entry_type: EntryType,
        filter: &EntryListFilter,
        page: &PageRequest<EntryKey>,
    ) -> CatalogStoreResult<Vec<(RegistryEntry, RegistryName)>> {
        let mut query = registry_entries::table
            .inner_join(registries::table)
            .filter(registry_entries::entry_type.eq(entry_type.as_str()))
            .select((EntryRow::as_select(), registries::name))
            .into_boxed();

        query = match entry_type {
            EntryType::Mcp => query.filter(
                registry_entries::id.eq_any(server_versions::table.select(server_versions::entry_id)),
            ),
            EntryType::Skill => query.filter(
                registry_entries::id.eq_any(skill_versions::table.select(skill_versions::entry_id)),
            ),
        };
        if filter.latest_only {
            query = match entry_type {
                EntryType::Mcp => query.filter(registry_entries::id.eq_any(
                    latest_server_versions::table.select(latest_server_versions::entry_id),
                )),
                EntryType::Skill => query.filter(registry_entries::id.eq_any(
                    latest_skill_versions::table.select(latest_skill_versions::entry_id),
                )),
            };
        }
        if let Some(registry) = &filter.registry {
            query = query.filter(registries::name.eq(registry.as_str()));
        }
        if let Some(name) = &filter.name {
            query = query.filter(registry_entries::name.eq(name.as_str()));
        }
        if let Some(term) = filter.search_term() {
            let pattern = format!("%{}%", escape_like(term));
            query = query.filter(
                registry_entries::name
                    .ilike(pattern.clone())
                    .or(registry_entries::title.ilike(pattern.clone()))
                    .or(registry_entries::description.ilike(pattern)),
            );
        }

        let descending = matches!(page.cursor(), Some(PageCursor::Before(_)));
        query = match page.cursor() {
            None => query.order((
                registry_entries::name.asc(),
                registry_entries::version.asc(),
                registry_entries::id.asc(),
            )),
            Some(PageCursor::After(key)) => query
                .filter(
                    registry_entries::name.gt(key.name.as_str()).or(registry_entries::name
                        .eq(key.name.as_str())
                        .and(
                            registry_entries::version.gt(key.version.as_str()).or(
                                registry_entries::version
                                    .eq(key.version.as_str())
                                    .and(registry_entries::id.gt(key.id.into_inner())),
                            ),
                        )),
                )
                .order((
                    registry_entries::name.asc(),
                    registry_entries::version.asc(),
                    registry_entries::id.asc(),
                )),
            Some(PageCursor::Before(key)) => query
                .filter(
                    registry_entries::name.lt(key.name.as_str()).or(registry_entries::name
                        .eq(key.name.as_str())
                        .and(
                            registry_entries::version.lt(key.version.as_str()).or(
                                registry_entries::version
                                    .eq(key.version.as_str())
                                    .and(registry_entries::id.lt(key.id.into_inner())),
                            ),
                        )),
                )
                .order((
                    registry_entries::name.desc(),
                    registry_entries::version.desc(),
                    registry_entries::id.desc(),
                )),
        };

        let mut rows = query
            .limit(page_limit(page.size()))
            .load::<(EntryRow, String)>(self.conn)
            .map_err(map_diesel_error)?;
        if descending {
            rows.reverse();
        }
        rows.into_iter().map(entry_with_registry).collect()
    }

    fn resolve_entry(
        &mut self,
        entry_type: EntryType,
        name: &EntryName,
        version: &VersionRef,
        registry: Option<&RegistryName>,
    ) -> CatalogStoreResult<(RegistryEntry, RegistryName)> {
        if let Some(registry_name) = registry {
            self.get_registry_by_name(registry_name)?;
        }

        let mut query = registry_entries::table
            .inner_join(registries::table)
            .filter(registry_entries::entry_type.eq(entry_type.as_str()))
            .filter(registry_entries::name.eq(name.as_str()))
            .select((EntryRow::as_select(), registries::name))
            .into_boxed();
        if let Some(registry_name) = registry {
            query = query.filter(registries::name.eq(registry_name.as_str()));
        }
        query = match (version, entry_type) {
            (VersionRef::Latest, EntryType::Mcp) => query.filter(registry_entries::id.eq_any(
                latest_server_versions::table.select(latest_server_versions::entry_id),
            )),
            (VersionRef::Latest, EntryType::Skill) => query.filter(registry_entries::id.eq_any(
                latest_skill_versions::table.select(latest_skill_versions::entry_id),
            )),
            (VersionRef::Exact(exact), EntryType::Mcp) => query
                .filter(registry_entries::version.eq(exact.as_str()))
                .filter(
                    registry_entries::id
                        .eq_any(server_versions::table.select(server_versions::entry_id)),
                ),
            (VersionRef::Exact(exact), EntryType::Skill) => query
                .filter(registry_entries::version.eq(exact.as_str()))
                .filter(
                    registry_entries::id
                        .eq_any(skill_versions::table.select(skill_versions::entry_id)),
                ),
        };

        let row = query
            .order((registries::created_at.asc(), registries::name.asc()))
            .first::<(EntryRow, String)>(self.conn)
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| {
                CatalogStoreError::not_found(format!("{entry_type} entry {name}@{version}"))
            })?;
        entry_with_registry(row)
    }

    fn server_details(&mut self, entry_ids: &[Uuid]) -> CatalogStoreResult<HashMap<Uuid, ServerDetails>> {
        server_versions::table
            .filter(server_versions::entry_id.eq_any(entry_ids))
            .select(ServerVersionRow::as_select())
            .load::<ServerVersionRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(|row| Ok((row.entry_id, row_to_server_details(row)?)))
            .collect()
    }

    fn skill_details(&mut self, entry_ids: &[Uuid]) -> CatalogStoreResult<HashMap<Uuid, SkillDetails>> {
        skill_versions::table
            .filter(skill_versions::entry_id.eq_any(entry_ids))
            .select(SkillVersionRow::as_select())
            .load::<SkillVersionRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(|row| Ok((row.entry_id, row_to_skill_details(row)?)))
            .collect()
    }

    fn latest_entry_ids(
        &mut self,
        entry_type: EntryType,
        entry_ids: &[Uuid],
    ) -> CatalogStoreResult<HashSet<Uuid>> {
        let ids = match entry_type {
            EntryType::Mcp => latest_server_versions::table
                .filter(latest_server_versions::entry_id.eq_any(entry_ids))
                .select(latest_server_versions::entry_id)
                .load::<Uuid>(self.conn),
            EntryType::Skill => latest_skill_versions::table
                .filter(latest_skill_versions::entry_id.eq_any(entry_ids))
                .select(latest_skill_versions::entry_id)
                .load::<Uuid>(self.conn),
        }
        .map_err(map_diesel_error)?;
        Ok(ids.into_iter().collect())
    }

    fn server_versions_for(
        &mut self,
        entries: Vec<(RegistryEntry, RegistryName)>,
    ) -> CatalogStoreResult<Vec<ServerVersion>> {
        let ids = entry_uuids(&entries);
        let mut details = self.server_details(&ids)?;
        let latest = self.latest_entry_ids(EntryType::Mcp, &ids)?;
        entries
            .into_iter()
            .map(|(entry, registry_name)| {
                let id = entry.id().into_inner();
                let row = details.remove(&id).ok_or_else(|| {
                    CatalogStoreError::not_found(format!("server version {id}"))
                })?;
                Ok(ServerVersion {
                    entry,
                    registry_name,
                    details: row,
                    is_latest: latest.contains(&id),
                })
            })
            .collect()
    }

    fn skill_versions_for(
        &mut self,
        entries: Vec<(RegistryEntry, RegistryName)>,
    ) -> CatalogStoreResult<Vec<SkillVersion>> {
        let ids = entry_uuids(&entries);
        let mut details = self.skill_details(&ids)?;
        let latest = self.latest_entry_ids(EntryType::Skill, &ids)?;
        entries
            .into_iter()
            .map(|(entry, registry_name)| {
                let id = entry.id().into_inner();
                let row = details
                    .remove(&id)
                    .ok_or_else(|| CatalogStoreError::not_found(format!("skill version {id}")))?;
                Ok(SkillVersion {
                    entry,
                    registry_name,
                    details: row,
                    is_latest: latest.contains(&id),
                })
            })
            .collect()
    }
}

impl CatalogTransaction for PgCatalogTransaction<'_> {
    fn insert_registry(&mut self, registry: &Registry) -> CatalogStoreResult<()> {
        diesel::insert_into(registries::table)
            .values(&to_registry_row(registry))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn bulk_upsert_registries(
        &mut self,
        rows: &[RegistryUpsert],
    ) -> CatalogStoreResult<Vec<Registry>> {
        let mut written = Vec::with_capacity(rows.len());
        for upsert in rows {
            let row = RegistryRow {
                id: upsert.id.into_inner(),
                name: upsert.name.as_str().to_owned(),
                reg_type: upsert.reg_type.as_str().to_owned(),
                creation_type: upsert.creation_type.as_str().to_owned(),
                syncable: upsert.syncable,
                created_at: upsert.timestamp,
                updated_at: upsert.timestamp,
            };
            let statement = diesel::insert_into(registries::table)
                .values(&row)
                .on_conflict(registries::name)
                .do_update()
                .set((
                    registries::reg_type.eq(excluded(registries::reg_type)),
                    registries::syncable.eq(excluded(registries::syncable)),
                    registries::updated_at.eq(excluded(registries::updated_at)),
                ));
            // `API` rows keep their values; the conflict update yields no row.
            let stored = diesel::query_dsl::methods::FilterDsl::filter(
                statement,
                registries::creation_type.eq(CreationType::Config.as_str()),
            )
            .returning(RegistryRow::as_returning())
            .get_result::<RegistryRow>(self.conn)
            .optional()
            .map_err(map_diesel_error)?;
            if let Some(stored_row) = stored {
                written.push(row_to_registry(stored_row)?);
            }
        }
        Ok(written)
    }

    fn delete_registries_not_in_list(&mut self, keep: &[RegistryId]) -> CatalogStoreResult<u64> {
        let kept: Vec<Uuid> = keep.iter().map(|id| id.into_inner()).collect();
        let deleted = diesel::delete(
            registries::table
                .filter(registries::creation_type.eq(CreationType::Config.as_str()))
                .filter(registries::id.ne_all(kept)),
        )
        .execute(self.conn)
        .map_err(map_diesel_error)?;
        Ok(affected(deleted))
    }

    fn get_api_registries_by_names(
        &mut self,
        names: &[RegistryName],
    ) -> CatalogStoreResult<Vec<RegistryName>> {
        let requested: Vec<String> = names.iter().map(|name| name.as_str().to_owned()).collect();
        let protected: HashSet<String> = registries::table
            .filter(registries::name.eq_any(requested))
            .filter(registries::creation_type.eq(CreationType::Api.as_str()))
            .select(registries::name)
            .load::<String>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .collect();
        Ok(names
            .iter()
            .filter(|name| protected.contains(name.as_str()))
            .cloned()
            .collect())
    }

    fn get_registry(&mut self, id: RegistryId) -> CatalogStoreResult<Registry> {
        let row = registries::table
            .find(id.into_inner())
            .select(RegistryRow::as_select())
            .first::<RegistryRow>(self.conn)
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry {id}")))?;
        row_to_registry(row)
    }

    fn get_registry_by_name(&mut self, name: &RegistryName) -> CatalogStoreResult<Registry> {
        let row = registries::table
            .filter(registries::name.eq(name.as_str()))
            .select(RegistryRow::as_select())
            .first::<RegistryRow>(self.conn)
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry {name}")))?;
        row_to_registry(row)
    }

    fn list_registries(
        &mut self,
        page: &PageRequest<RegistryKey>,
    ) -> CatalogStoreResult<Vec<Registry>> {
        let mut query = registries::table
            .select(RegistryRow::as_select())
            .into_boxed();
        let descending = matches!(page.cursor(), Some(PageCursor::Before(_)));
        query = match page.cursor() {
            None => query.order((registries::created_at.asc(), registries::name.asc())),
            Some(PageCursor::After(key)) => query
                .filter(
                    registries::created_at.gt(key.created_at).or(registries::created_at
                        .eq(key.created_at)
                        .and(registries::name.gt(key.name.as_str()))),
                )
                .order((registries::created_at.asc(), registries::name.asc())),
            Some(PageCursor::Before(key)) => query
                .filter(
                    registries::created_at.lt(key.created_at).or(registries::created_at
                        .eq(key.created_at)
                        .and(registries::name.lt(key.name.as_str()))),
                )
                .order((registries::created_at.desc(), registries::name.desc())),
        };

        let mut rows = query
            .limit(page_limit(page.size()))
            .load::<RegistryRow>(self.conn)
            .map_err(map_diesel_error)?;
        if descending {
            rows.reverse();
        }
        rows.into_iter().map(row_to_registry).collect()
    }

    fn list_syncable_registries(&mut self) -> CatalogStoreResult<Vec<Registry>> {
        registries::table
            .filter(registries::syncable.eq(true))
            .filter(registries::creation_type.eq(CreationType::Config.as_str()))
            .order((registries::created_at.asc(), registries::name.asc()))
            .select(RegistryRow::as_select())
            .load::<RegistryRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(row_to_registry)
            .collect()
    }

    fn insert_registry_entry(&mut self, entry: &RegistryEntry) -> CatalogStoreResult<()> {
        let row = to_entry_row(entry);
        // Savepoint so a duplicate leaves the outer transaction usable.
        self.conn
            .transaction(|conn| {
                diesel::insert_into(registry_entries::table)
                    .values(&row)
                    .execute(conn)
            })
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn find_registry_entry(
        &mut self,
        reg_id: RegistryId,
        name: &EntryName,
        version: &EntryVersion,
    ) -> CatalogStoreResult<Option<RegistryEntry>> {
        registry_entries::table
            .filter(registry_entries::reg_id.eq(reg_id.into_inner()))
            .filter(registry_entries::name.eq(name.as_str()))
            .filter(registry_entries::version.eq(version.as_str()))
            .select(EntryRow::as_select())
            .first::<EntryRow>(self.conn)
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_entry)
            .transpose()
    }

    fn insert_server_version(
        &mut self,
        entry_id: EntryId,
        details: &ServerDetails,
    ) -> CatalogStoreResult<()> {
        self.entry_for_version_row(entry_id, EntryType::Mcp)?;
        diesel::insert_into(server_versions::table)
            .values(&to_server_version_row(entry_id, details)?)
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn upsert_server_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &ServerDetails,
    ) -> CatalogStoreResult<()> {
        self.ensure_sync_owned(entry_id, EntryType::Mcp)?;
        let row = to_server_version_row(entry_id, details)?;
        diesel::insert_into(server_versions::table)
            .values(&row)
            .on_conflict(server_versions::entry_id)
            .do_update()
            .set(&row)
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn insert_skill_version(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()> {
        self.entry_for_version_row(entry_id, EntryType::Skill)?;
        diesel::insert_into(skill_versions::table)
            .values(&to_skill_version_row(entry_id, details))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn insert_skill_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()> {
        self.ensure_sync_owned(entry_id, EntryType::Skill)?;
        self.insert_skill_version(entry_id, details)
    }

    fn upsert_skill_version_for_sync(
        &mut self,
        entry_id: EntryId,
        details: &SkillDetails,
    ) -> CatalogStoreResult<()> {
        self.ensure_sync_owned(entry_id, EntryType::Skill)?;
        let row = to_skill_version_row(entry_id, details);
        diesel::insert_into(skill_versions::table)
            .values(&row)
            .on_conflict(skill_versions::entry_id)
            .do_update()
            .set(&row)
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn insert_server_package(
        &mut self,
        entry_id: EntryId,
        package: &ServerPackage,
    ) -> CatalogStoreResult<()> {
        diesel::insert_into(server_packages::table)
            .values(&to_server_package_row(entry_id, package)?)
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn insert_server_remote(
        &mut self,
        entry_id: EntryId,
        remote: &ServerRemote,
    ) -> CatalogStoreResult<()> {
        diesel::insert_into(server_remotes::table)
            .values(&to_server_remote_row(entry_id, remote)?)
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn insert_server_icon(
        &mut self,
        entry_id: EntryId,
        icon: &ServerIcon,
    ) -> CatalogStoreResult<()> {
        let row = to_server_icon_row(entry_id, icon);
        diesel::insert_into(server_icons::table)
            .values(&row)
            .on_conflict((server_icons::entry_id, server_icons::theme))
            .do_update()
            .set(&row)
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn insert_skill_git_package(
        &mut self,
        entry_id: EntryId,
        package: &SkillGitPackage,
    ) -> CatalogStoreResult<()> {
        diesel::insert_into(skill_git_packages::table)
            .values(&to_skill_git_row(entry_id, package))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn insert_skill_oci_package(
        &mut self,
        entry_id: EntryId,
        package: &SkillOciPackage,
    ) -> CatalogStoreResult<()> {
        diesel::insert_into(skill_oci_packages::table)
            .values(&to_skill_oci_row(entry_id, package))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn delete_server_children(&mut self, entry_id: EntryId) -> CatalogStoreResult<()> {
        let id = entry_id.into_inner();
        diesel::delete(server_packages::table.filter(server_packages::entry_id.eq(id)))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        diesel::delete(server_remotes::table.filter(server_remotes::entry_id.eq(id)))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        diesel::delete(server_icons::table.filter(server_icons::entry_id.eq(id)))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn delete_skill_packages(&mut self, entry_id: EntryId) -> CatalogStoreResult<()> {
        let id = entry_id.into_inner();
        diesel::delete(skill_git_packages::table.filter(skill_git_packages::entry_id.eq(id)))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        diesel::delete(skill_oci_packages::table.filter(skill_oci_packages::entry_id.eq(id)))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn delete_orphaned_servers(
        &mut self,
        reg_id: RegistryId,
        keep: &[EntryId],
    ) -> CatalogStoreResult<u64> {
        delete_orphans(self.conn, reg_id, EntryType::Mcp, keep)
    }

    fn delete_orphaned_skills(
        &mut self,
        reg_id: RegistryId,
        keep: &[EntryId],
    ) -> CatalogStoreResult<u64> {
        delete_orphans(self.conn, reg_id, EntryType::Skill, keep)
    }

    fn upsert_latest_server_version(
        &mut self,
        pointer: &LatestVersionPointer,
    ) -> CatalogStoreResult<()> {
        diesel::insert_into(latest_server_versions::table)
            .values(&to_latest_server_row(pointer))
            .on_conflict((latest_server_versions::reg_id, latest_server_versions::name))
            .do_update()
            .set((
                latest_server_versions::version.eq(excluded(latest_server_versions::version)),
                latest_server_versions::entry_id.eq(excluded(latest_server_versions::entry_id)),
            ))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn upsert_latest_skill_version(
        &mut self,
        pointer: &LatestVersionPointer,
    ) -> CatalogStoreResult<()> {
        diesel::insert_into(latest_skill_versions::table)
            .values(&to_latest_skill_row(pointer))
            .on_conflict((latest_skill_versions::reg_id, latest_skill_versions::name))
            .do_update()
            .set((
                latest_skill_versions::version.eq(excluded(latest_skill_versions::version)),
                latest_skill_versions::entry_id.eq(excluded(latest_skill_versions::entry_id)),
            ))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn get_server_version(
        &mut self,
        name: &EntryName,
        version: &VersionRef,
        registry: Option<&RegistryName>,
    ) -> CatalogStoreResult<ServerVersion> {
        let resolved = self.resolve_entry(EntryType::Mcp, name, version, registry)?;
        self.server_versions_for(vec![resolved])?
            .pop()
            .ok_or_else(|| CatalogStoreError::not_found(format!("MCP entry {name}@{version}")))
    }

    fn get_skill_version(
        &mut self,
        name: &EntryName,
        version: &VersionRef,
        registry: Option<&RegistryName>,
    ) -> CatalogStoreResult<SkillVersion> {
        let resolved = self.resolve_entry(EntryType::Skill, name, version, registry)?;
        self.skill_versions_for(vec![resolved])?
            .pop()
            .ok_or_else(|| CatalogStoreError::not_found(format!("SKILL entry {name}@{version}")))
    }

    fn list_servers(
        &mut self,
        filter: &EntryListFilter,
        page: &PageRequest<EntryKey>,
    ) -> CatalogStoreResult<Vec<ServerVersion>> {
        let entries = self.select_entries(EntryType::Mcp, filter, page)?;
        self.server_versions_for(entries)
    }

    fn list_skills(
        &mut self,
        filter: &EntryListFilter,
        page: &PageRequest<EntryKey>,
    ) -> CatalogStoreResult<Vec<SkillVersion>> {
        let entries = self.select_entries(EntryType::Skill, filter, page)?;
        self.skill_versions_for(entries)
    }

    fn list_server_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerPackage)>> {
        server_packages::table
            .filter(server_packages::entry_id.eq_any(uuids(entry_ids)))
            .order(server_packages::seq.asc())
            .select(ServerPackageRow::as_select())
            .load::<ServerPackageRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(row_to_server_package)
            .collect()
    }

    fn list_server_remotes(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerRemote)>> {
        server_remotes::table
            .filter(server_remotes::entry_id.eq_any(uuids(entry_ids)))
            .order(server_remotes::seq.asc())
            .select(ServerRemoteRow::as_select())
            .load::<ServerRemoteRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(row_to_server_remote)
            .collect()
    }

    fn list_server_icons(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, ServerIcon)>> {
        server_icons::table
            .filter(server_icons::entry_id.eq_any(uuids(entry_ids)))
            .order((server_icons::entry_id.asc(), server_icons::theme.asc()))
            .select(ServerIconRow::as_select())
            .load::<ServerIconRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(row_to_server_icon)
            .collect()
    }

    fn list_skill_git_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, SkillGitPackage)>> {
        Ok(skill_git_packages::table
            .filter(skill_git_packages::entry_id.eq_any(uuids(entry_ids)))
            .order(skill_git_packages::seq.asc())
            .select(SkillGitPackageRow::as_select())
            .load::<SkillGitPackageRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(row_to_skill_git)
            .collect())
    }

    fn list_skill_oci_packages(
        &mut self,
        entry_ids: &[EntryId],
    ) -> CatalogStoreResult<Vec<(EntryId, SkillOciPackage)>> {
        Ok(skill_oci_packages::table
            .filter(skill_oci_packages::entry_id.eq_any(uuids(entry_ids)))
            .order(skill_oci_packages::seq.asc())
            .select(SkillOciPackageRow::as_select())
            .load::<SkillOciPackageRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(row_to_skill_oci)
            .collect())
    }

    fn insert_registry_sync(&mut self, sync: &RegistrySync) -> CatalogStoreResult<()> {
        diesel::insert_into(registry_syncs::table)
            .values(&to_sync_row(sync))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn finish_registry_sync(
        &mut self,
        sync_id: SyncId,
        completion: &SyncCompletion,
        ended_at: DateTime<Utc>,
    ) -> CatalogStoreResult<RegistrySync> {
        let row = registry_syncs::table
            .find(sync_id.into_inner())
            .select(RegistrySyncRow::as_select())
            .for_update()
            .first::<RegistrySyncRow>(self.conn)
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| CatalogStoreError::not_found(format!("registry sync {sync_id}")))?;
        let mut sync = row_to_sync(row)?;
        sync.finish(completion, ended_at).map_err(|err| {
            CatalogStoreError::conflict(format!("registry sync {sync_id}: {err}"))
        })?;

        diesel::update(registry_syncs::table.find(sync_id.into_inner()))
            .set((
                registry_syncs::status.eq(sync.status().as_str()),
                registry_syncs::error_msg.eq(sync.error_msg()),
                registry_syncs::ended_at.eq(sync.ended_at()),
            ))
            .execute(self.conn)
            .map_err(map_diesel_error)?;
        Ok(sync)
    }

    fn get_latest_registry_sync(
        &mut self,
        reg_id: RegistryId,
    ) -> CatalogStoreResult<Option<RegistrySync>> {
        registry_syncs::table
            .filter(registry_syncs::reg_id.eq(reg_id.into_inner()))
            .order((registry_syncs::started_at.desc(), registry_syncs::id.desc()))
            .select(RegistrySyncRow::as_select())
            .first::<RegistrySyncRow>(self.conn)
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_sync)
            .transpose()
    }

    fn list_registry_syncs(
        &mut self,
        reg_id: RegistryId,
        limit: usize,
    ) -> CatalogStoreResult<Vec<RegistrySync>> {
        registry_syncs::table
            .filter(registry_syncs::reg_id.eq(reg_id.into_inner()))
            .order((registry_syncs::started_at.desc(), registry_syncs::id.desc()))
            .limit(page_limit(limit))
            .select(RegistrySyncRow::as_select())
            .load::<RegistrySyncRow>(self.conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(row_to_sync)
            .collect()
    }

    fn fail_stale_registry_syncs(
        &mut self,
        cutoff: DateTime<Utc>,
        error_msg: &str,
        ended_at: DateTime<Utc>,
    ) -> CatalogStoreResult<Vec<RegistrySync>> {
        diesel::update(
            registry_syncs::table
                .filter(registry_syncs::status.eq(SyncStatus::InProgress.as_str()))
                .filter(registry_syncs::started_at.le(cutoff)),
        )
        .set((
            registry_syncs::status.eq(SyncStatus::Failed.as_str()),
            registry_syncs::error_msg.eq(Some(error_msg)),
            registry_syncs::ended_at.eq(Some(ended_at)),
        ))
        .returning(RegistrySyncRow::as_returning())
        .get_results::<RegistrySyncRow>(self.conn)
        .map_err(map_diesel_error)?
        .into_iter()
        .map(row_to_sync)
        .collect()
    }
}

fn delete_orphans(
    conn: &mut PgConnection,
    reg_id: RegistryId,
    entry_type: EntryType,
    keep: &[EntryId],
) -> CatalogStoreResult<u64> {
    let deleted = diesel::delete(
        registry_entries::table
            .filter(registry_entries::reg_id.eq(reg_id.into_inner()))
            .filter(registry_entries::entry_type.eq(entry_type.as_str()))
            .filter(registry_entries::creation_type.eq(CreationType::Config.as_str()))
            .filter(registry_entries::id.ne_all(uuids(keep))),
    )
    .execute(conn)
    .map_err(map_diesel_error)?;
    Ok(affected(deleted))
}

fn entry_with_registry(
    (row, registry_name): (EntryRow, String),
) -> CatalogStoreResult<(RegistryEntry, RegistryName)> {
    let registry =
        RegistryName::new(registry_name).map_err(CatalogStoreError::invalid_persisted_data)?;
    Ok((row_to_entry(row)?, registry))
}

fn entry_uuids(entries: &[(RegistryEntry, RegistryName)]) -> Vec<Uuid> {
    entries
        .iter()
        .map(|(entry, _)| entry.id().into_inner())
        .collect()
}

fn uuids(ids: &[EntryId]) -> Vec<Uuid> {
    ids.iter().map(|id| id.into_inner()).collect()
}

fn page_limit(size: usize) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn affected(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// Escapes `ILIKE` wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for character in term.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

/// Maps Diesel errors onto the store's error taxonomy.
///
/// Uniqueness violations become conflicts and foreign key violations become
/// missing parents. Serialization failures, deadlocks and dropped
/// connections are transient.
pub(super) fn map_diesel_error(err: DieselError) -> CatalogStoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
            CatalogStoreError::conflict(describe(info.as_ref()))
        }
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, ref info) => {
            CatalogStoreError::not_found(describe(info.as_ref()))
        }
        DieselError::DatabaseError(
            DatabaseErrorKind::CheckViolation
            | DatabaseErrorKind::NotNullViolation
            | DatabaseErrorKind::ReadOnlyTransaction,
            ref info,
        ) => CatalogStoreError::invalid(describe(info.as_ref())),
        DieselError::DatabaseError(
            DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::ClosedConnection,
            _,
        ) => CatalogStoreError::transient(err),
        DieselError::DatabaseError(_, ref info) if info.message().contains("deadlock detected") => {
            CatalogStoreError::transient(err)
        }
        _ => CatalogStoreError::persistence(err),
    }
}

fn describe(info: &(dyn DatabaseErrorInformation + Send + Sync)) -> String {
    info.constraint_name().map_or_else(
        || info.message().to_owned(),
        |constraint| format!("{} ({constraint})", info.message()),
    )
}
