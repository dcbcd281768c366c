//! Reverse-DNS server names accepted at the publishing boundary.

use super::{CatalogDomainError, EntryName};

const MIN_SERVER_NAME_LENGTH: usize = 3;
const MAX_SERVER_NAME_LENGTH: usize = 200;

/// Server name in `namespace/name` form.
///
/// Both halves must start and end with an ASCII alphanumeric character and
/// may contain `.`, `_` and `-` in between.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerName {
    full: EntryName,
    separator: usize,
}

impl ServerName {
    /// Parses and validates a server name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::InvalidServerName`] naming the first
    /// rule the input breaks.
    pub fn parse(value: &str) -> Result<Self, CatalogDomainError> {
        let invalid = |reason| CatalogDomainError::InvalidServerName {
            name: value.to_owned(),
            reason,
        };

        let length = value.chars().count();
        if !(MIN_SERVER_NAME_LENGTH..=MAX_SERVER_NAME_LENGTH).contains(&length) {
            return Err(invalid("must be between 3 and 200 characters"));
        }

        if value.matches('/').count() != 1 {
            return Err(invalid("must contain exactly one '/'"));
        }

        let Some((namespace, name)) = value.split_once('/') else {
            return Err(invalid("must contain exactly one '/'"));
        };

        if !is_valid_segment(namespace) {
            return Err(invalid("namespace has invalid format"));
        }

        if !is_valid_segment(name) {
            return Err(invalid("name has invalid format"));
        }

        let full = EntryName::new(value).map_err(|_| invalid("name has invalid format"))?;
        Ok(Self {
            full,
            separator: namespace.len(),
        })
    }

    /// Returns the namespace half.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.full.as_str().get(..self.separator).unwrap_or_default()
    }

    /// Returns the name half.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.full
            .as_str()
            .get(self.separator + 1..)
            .unwrap_or_default()
    }

    /// Returns the full name as a catalog entry name.
    #[must_use]
    pub const fn as_entry_name(&self) -> &EntryName {
        &self.full
    }

    /// Consumes the server name, returning the catalog entry name.
    #[must_use]
    pub fn into_entry_name(self) -> EntryName {
        self.full
    }
}

/// Checks `^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?$`.
fn is_valid_segment(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };

    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-'))
}
