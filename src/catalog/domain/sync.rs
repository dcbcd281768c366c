//! Sync run audit records and the per-attempt phase machine.

use super::{CatalogDomainError, ParseCatalogEnumError, RegistryId, SyncId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// The run has started and not yet finished.
    InProgress,
    /// The run applied the snapshot successfully.
    Completed,
    /// The run stopped on an unrecoverable error.
    Failed,
}

impl SyncStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SyncStatus {
    type Error = ParseCatalogEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ParseCatalogEnumError::new("sync status", value)),
        }
    }
}

/// Terminal outcome written when a sync run closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCompletion {
    /// The run succeeded.
    Completed,
    /// The run failed with a sanitized message.
    Failed(String),
}

impl SyncCompletion {
    /// Returns the status this outcome persists.
    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        match self {
            Self::Completed => SyncStatus::Completed,
            Self::Failed(_) => SyncStatus::Failed,
        }
    }

    /// Returns the persisted error message, if any.
    #[must_use]
    pub fn error_msg(&self) -> Option<&str> {
        match self {
            Self::Completed => None,
            Self::Failed(message) => Some(message),
        }
    }
}

/// Audit record of one reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySync {
    id: SyncId,
    reg_id: RegistryId,
    status: SyncStatus,
    error_msg: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRegistrySyncData {
    /// Persisted identifier.
    pub id: SyncId,
    /// Persisted registry.
    pub reg_id: RegistryId,
    /// Persisted status.
    pub status: SyncStatus,
    /// Persisted sanitized error message.
    pub error_msg: Option<String>,
    /// Persisted start timestamp.
    pub started_at: DateTime<Utc>,
    /// Persisted end timestamp.
    pub ended_at: Option<DateTime<Utc>>,
}

impl RegistrySync {
    /// Opens a new in-progress run for `reg_id`.
    #[must_use]
    pub fn start(reg_id: RegistryId, clock: &impl Clock) -> Self {
        Self {
            id: SyncId::new(),
            reg_id,
            status: SyncStatus::InProgress,
            error_msg: None,
            started_at: clock.utc(),
            ended_at: None,
        }
    }

    /// Reconstructs a sync run from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedRegistrySyncData) -> Self {
        Self {
            id: data.id,
            reg_id: data.reg_id,
            status: data.status,
            error_msg: data.error_msg,
            started_at: data.started_at,
            ended_at: data.ended_at,
        }
    }

    /// Applies the terminal transition.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::InvalidSyncTransition`] when the run is
    /// already terminal.
    pub fn finish(
        &mut self,
        completion: &SyncCompletion,
        ended_at: DateTime<Utc>,
    ) -> Result<(), CatalogDomainError> {
        if self.status.is_terminal() {
            return Err(CatalogDomainError::InvalidSyncTransition {
                from: self.status.to_string(),
                to: completion.status().to_string(),
            });
        }
        self.status = completion.status();
        self.error_msg = completion.error_msg().map(str::to_owned);
        self.ended_at = Some(ended_at);
        Ok(())
    }

    /// Returns the run identifier.
    #[must_use]
    pub const fn id(&self) -> SyncId {
        self.id
    }

    /// Returns the registry being synced.
    #[must_use]
    pub const fn reg_id(&self) -> RegistryId {
        self.reg_id
    }

    /// Returns the run status.
    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        self.status
    }

    /// Returns the sanitized error message of a failed run.
    #[must_use]
    pub fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }

    /// Returns when the run started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run reached a terminal status.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }
}

/// In-memory phase of a running sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// The audit row is open.
    Started,
    /// The snapshot is being fetched and validated.
    Fetching,
    /// The snapshot is being written to the catalog.
    Applying,
    /// The attempt succeeded.
    Completed,
    /// The attempt failed.
    Failed,
}

impl SyncPhase {
    /// Returns a stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Fetching => "fetching",
            Self::Applying => "applying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns whether the phase is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Started, Self::Fetching)
                | (Self::Fetching, Self::Applying)
                | (Self::Applying, Self::Completed)
                | (Self::Started | Self::Fetching | Self::Applying, Self::Failed)
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Phase tracker for one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAttempt {
    sync_id: SyncId,
    phase: SyncPhase,
}

impl SyncAttempt {
    /// Begins tracking the attempt recorded under `sync_id`.
    #[must_use]
    pub const fn new(sync_id: SyncId) -> Self {
        Self {
            sync_id,
            phase: SyncPhase::Started,
        }
    }

    /// Moves the attempt to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::InvalidSyncTransition`] when the phase
    /// machine forbids the move.
    pub fn advance(&mut self, target: SyncPhase) -> Result<(), CatalogDomainError> {
        if !self.phase.can_transition_to(target) {
            return Err(CatalogDomainError::InvalidSyncTransition {
                from: self.phase.to_string(),
                to: target.to_string(),
            });
        }
        self.phase = target;
        Ok(())
    }

    /// Returns the audit row identifier.
    #[must_use]
    pub const fn sync_id(&self) -> SyncId {
        self.sync_id
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> SyncPhase {
        self.phase
    }
}
