/// Document types shared by every store implementation
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::StoreError;

/// Top-level fields of a document.
pub type Fields = Map<String, Value>;

/// Address of one document: collection plus opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A schemaless document as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub reference: DocumentRef,
    pub fields: Fields,
}

impl Document {
    /// Decodes the document into a typed payload.
    ///
    /// This is the single place where schemaless data is checked; a mismatch
    /// becomes [`StoreError::DataShape`] naming the document.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            StoreError::DataShape {
                document: self.reference.to_string(),
                message: e.to_string(),
            }
        })
    }
}

/// A subscription document in `sections_tracked` or `sections_archive`.
///
/// `users` entries are opaque and passed through untouched. `term` and
/// `crn` are kept as whatever JSON the document holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<Value>,
    pub users: Vec<Value>,
    /// Any other fields the document carries
    #[serde(flatten)]
    pub extra: Fields,
}

/// A document in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub number: String,
    #[serde(flatten)]
    pub extra: Fields,
}
