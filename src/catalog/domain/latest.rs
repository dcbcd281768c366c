//! Latest-version pointer designating the current version of a name.

use super::{EntryId, EntryName, EntryVersion, RegistryId};
use serde::{Deserialize, Serialize};

/// Maps `(reg_id, name)` to the entry currently considered latest.
///
/// The pointer is derived state. The catalog records whichever version the
/// writer designates and never compares version strings itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatestVersionPointer {
    /// Registry scoping the name.
    pub reg_id: RegistryId,
    /// Entry name.
    pub name: EntryName,
    /// Designated version, kept for display without a join.
    pub version: EntryVersion,
    /// Entry the pointer references.
    pub entry_id: EntryId,
}

impl LatestVersionPointer {
    /// Creates a pointer.
    #[must_use]
    pub const fn new(
        reg_id: RegistryId,
        name: EntryName,
        version: EntryVersion,
        entry_id: EntryId,
    ) -> Self {
        Self {
            reg_id,
            name,
            version,
            entry_id,
        }
    }
}
