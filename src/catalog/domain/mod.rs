//! Domain model for the reconciled catalog.
//!
//! Registries own versioned entries; each entry carries either a server or a
//! skill payload with child collections. Provenance (`CONFIG` versus `API`)
//! decides what sync may touch. Latest-version pointers, sync run records
//! and keyset pagination keys live here too. Infrastructure concerns remain
//! outside this boundary.

mod blob;
mod entry;
mod error;
mod ids;
mod latest;
mod page;
mod registry;
mod server;
mod server_name;
mod skill;
mod snapshot;
mod sync;
mod version;

pub use blob::MetadataBlob;
pub use entry::{EntryName, EntryType, NewEntryParams, PersistedEntryData, RegistryEntry};
pub use error::{CatalogDomainError, ParseCatalogEnumError};
pub use ids::{EntryId, RegistryId, SyncId};
pub use latest::LatestVersionPointer;
pub use page::{
    EntryKey, EntryListFilter, Page, PageCursor, PageParams, PageRequest, RegistryKey,
    decode_cursor, encode_cursor,
};
pub use registry::{
    CreationType, DeclaredRegistry, PersistedRegistryData, Registry, RegistryName, RegistryType,
    RegistryUpsert,
};
pub use server::{
    IconTheme, InputVariable, PackageTransport, ServerDetails, ServerIcon, ServerPackage,
    ServerPayload, ServerRemote, ServerVersion, ServerVersionDetail, SourceRepository,
};
pub use server_name::ServerName;
pub use skill::{
    SkillDetails, SkillGitPackage, SkillOciPackage, SkillPayload, SkillStatus, SkillVersion,
    SkillVersionDetail,
};
pub use snapshot::{SnapshotEntry, SnapshotPayload, SourceSnapshot};
pub use sync::{
    PersistedRegistrySyncData, RegistrySync, SyncAttempt, SyncCompletion, SyncPhase, SyncStatus,
};
pub use version::{EntryVersion, LATEST_VERSION_TOKEN, VersionRef};
