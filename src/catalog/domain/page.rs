//! Keyset pagination keys, requests and opaque cursors.
//!
//! Entry listings are totally ordered by `(name, version, id)` and registry
//! listings by `(created_at, name)`. A cursor carries the key of the row a
//! page boundary stopped at; `next` resumes strictly after it and `prev`
//! strictly before it. Pages are always returned in ascending order.

use super::{CatalogDomainError, EntryId, EntryName, EntryVersion, RegistryName};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Sort key for entry listings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    /// Entry name; primary sort column.
    pub name: EntryName,
    /// Entry version; secondary sort column.
    pub version: EntryVersion,
    /// Entry identifier; tie-breaker across registries.
    pub id: EntryId,
}

/// Sort key for registry listings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistryKey {
    /// Creation timestamp; primary sort column.
    pub created_at: DateTime<Utc>,
    /// Registry name; tie-breaker.
    pub name: RegistryName,
}

/// Position a page resumes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor<K> {
    /// Rows strictly after the key.
    After(K),
    /// Rows strictly before the key.
    Before(K),
}

/// Bounded page request over keys of type `K`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<K> {
    size: usize,
    cursor: Option<PageCursor<K>>,
}

impl<K> PageRequest<K> {
    /// Requests the first page.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::InvalidPageSize`] when `size` is zero.
    pub fn first(size: usize) -> Result<Self, CatalogDomainError> {
        Self::with_cursor(size, None)
    }

    /// Requests the page strictly after `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::InvalidPageSize`] when `size` is zero.
    pub fn after(size: usize, key: K) -> Result<Self, CatalogDomainError> {
        Self::with_cursor(size, Some(PageCursor::After(key)))
    }

    /// Requests the page strictly before `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::InvalidPageSize`] when `size` is zero.
    pub fn before(size: usize, key: K) -> Result<Self, CatalogDomainError> {
        Self::with_cursor(size, Some(PageCursor::Before(key)))
    }

    fn with_cursor(
        size: usize,
        cursor: Option<PageCursor<K>>,
    ) -> Result<Self, CatalogDomainError> {
        if size == 0 {
            return Err(CatalogDomainError::InvalidPageSize);
        }
        Ok(Self { size, cursor })
    }

    /// Returns the page cap.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns the resume position.
    #[must_use]
    pub const fn cursor(&self) -> Option<&PageCursor<K>> {
        self.cursor.as_ref()
    }
}

impl<K: Ord> PageRequest<K> {
    /// Selects this page from `items`, which must already be sorted
    /// ascending by `key`.
    ///
    /// Stores without native keyset queries use this to mirror the SQL
    /// semantics exactly.
    #[must_use]
    pub fn select<T>(&self, items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
        match &self.cursor {
            None => items.into_iter().take(self.size).collect(),
            Some(PageCursor::After(boundary)) => items
                .into_iter()
                .filter(|item| key(item) > *boundary)
                .take(self.size)
                .collect(),
            Some(PageCursor::Before(boundary)) => {
                let mut preceding: Vec<T> = items
                    .into_iter()
                    .filter(|item| key(item) < *boundary)
                    .collect();
                let skip = preceding.len().saturating_sub(self.size);
                preceding.split_off(skip)
            }
        }
    }
}

/// Raw page parameters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageParams {
    /// Requested page cap; `None` selects the configured default.
    pub size: Option<usize>,
    /// Opaque cursor to resume after.
    pub next: Option<String>,
    /// Opaque cursor to resume before.
    pub prev: Option<String>,
}

impl PageParams {
    /// Requests the first page with the default size.
    #[must_use]
    pub const fn first_page() -> Self {
        Self {
            size: None,
            next: None,
            prev: None,
        }
    }

    /// Sets the page cap.
    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Resumes after an opaque cursor.
    #[must_use]
    pub fn with_next(mut self, cursor: impl Into<String>) -> Self {
        self.next = Some(cursor.into());
        self
    }

    /// Resumes before an opaque cursor.
    #[must_use]
    pub fn with_prev(mut self, cursor: impl Into<String>) -> Self {
        self.prev = Some(cursor.into());
        self
    }

    /// Resolves caller parameters into a typed request.
    ///
    /// A missing size falls back to `default_size`; sizes above `max_size`
    /// are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError`] when the size is zero, both cursors are
    /// present or a cursor cannot be decoded.
    pub fn resolve<K: DeserializeOwned>(
        &self,
        default_size: usize,
        max_size: usize,
    ) -> Result<PageRequest<K>, CatalogDomainError> {
        let size = self.size.unwrap_or(default_size).min(max_size);
        match (&self.next, &self.prev) {
            (Some(_), Some(_)) => Err(CatalogDomainError::ConflictingCursors),
            (Some(next), None) => PageRequest::after(size, decode_cursor(next)?),
            (None, Some(prev)) => PageRequest::before(size, decode_cursor(prev)?),
            (None, None) => PageRequest::first(size),
        }
    }
}

/// One page of results with opaque cursors for both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in ascending key order.
    pub items: Vec<T>,
    /// Cursor resuming after the last item; absent on an empty page.
    pub next: Option<String>,
    /// Cursor resuming before the first item; absent on an empty page.
    pub prev: Option<String>,
}

impl<T> Page<T> {
    /// Builds a page, deriving cursors from the boundary items.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::InvalidCursor`] when a key cannot be
    /// serialized.
    pub fn from_items<K: Serialize>(
        items: Vec<T>,
        key: impl Fn(&T) -> K,
    ) -> Result<Self, CatalogDomainError> {
        let next = items.last().map(|item| encode_cursor(&key(item))).transpose()?;
        let prev = items.first().map(|item| encode_cursor(&key(item))).transpose()?;
        Ok(Self { items, next, prev })
    }

    /// Maps the items, keeping the cursors.
    #[must_use]
    pub fn map<U>(self, transform: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(transform).collect(),
            next: self.next,
            prev: self.prev,
        }
    }
}

/// Encodes a key as an opaque URL-safe cursor.
///
/// # Errors
///
/// Returns [`CatalogDomainError::InvalidCursor`] when serialization fails.
pub fn encode_cursor<K: Serialize>(key: &K) -> Result<String, CatalogDomainError> {
    let json =
        serde_json::to_vec(key).map_err(|err| CatalogDomainError::InvalidCursor(err.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decodes an opaque cursor produced by [`encode_cursor`].
///
/// # Errors
///
/// Returns [`CatalogDomainError::InvalidCursor`] when the text is not a
/// cursor for `K`.
pub fn decode_cursor<K: DeserializeOwned>(cursor: &str) -> Result<K, CatalogDomainError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim())
        .map_err(|err| CatalogDomainError::InvalidCursor(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| CatalogDomainError::InvalidCursor(err.to_string()))
}

/// Filter applied to entry listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryListFilter {
    /// Restrict to one registry.
    pub registry: Option<RegistryName>,
    /// Restrict to one exact entry name.
    pub name: Option<EntryName>,
    /// Case-insensitive substring over name, title and description.
    pub search: Option<String>,
    /// Only entries referenced by a latest pointer.
    pub latest_only: bool,
}

impl EntryListFilter {
    /// Returns the search term when it is non-blank.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}
