//! Opaque, size-bounded JSON metadata documents.

use super::CatalogDomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema-less JSON document stored verbatim alongside typed rows.
///
/// The catalog never inspects the contents. The only guarantees are that the
/// text was produced by a JSON serializer and that it fits under the
/// configured byte limit when it entered the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataBlob(String);

impl MetadataBlob {
    /// Serializes `value` into a blob, enforcing `limit` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogDomainError::MetadataTooLarge`] when the serialized
    /// document exceeds `limit`, or
    /// [`CatalogDomainError::InvalidMetadata`] when serialization fails.
    pub fn from_json(
        field: &'static str,
        value: &Value,
        limit: usize,
    ) -> Result<Self, CatalogDomainError> {
        let text =
            serde_json::to_string(value).map_err(|err| CatalogDomainError::InvalidMetadata {
                field,
                reason: err.to_string(),
            })?;

        if text.len() > limit {
            return Err(CatalogDomainError::MetadataTooLarge {
                field,
                size: text.len(),
                limit,
            });
        }

        Ok(Self(text))
    }

    /// Serializes an optional value; `None` and JSON `null` yield `None`.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::from_json`] failures.
    pub fn from_optional_json(
        field: &'static str,
        value: Option<&Value>,
        limit: usize,
    ) -> Result<Option<Self>, CatalogDomainError> {
        value
            .filter(|inner| !inner.is_null())
            .map(|inner| Self::from_json(field, inner, limit))
            .transpose()
    }

    /// Wraps text already persisted by the catalog.
    #[must_use]
    pub const fn from_persisted(text: String) -> Self {
        Self(text)
    }

    /// Returns the serialized document.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the serialized size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the serialized document is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the stored document back into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when the stored text is not JSON.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.0)
    }
}
