/// Document store access
///
/// The rest of the crate only talks to storage through [`DocumentStore`].
/// The contract offers no atomicity across calls;
/// callers that chain calls must order them so a crash between any two
/// leaves data recoverable.
mod error;
mod sqlite;
mod types;

pub use error::StoreError;
pub use sqlite::SqliteDocumentStore;
pub use types::{Document, DocumentRef, Fields, Subscription, UserRecord};

/// Collection holding user profiles (phone numbers).
pub const USERS: &str = "users";
/// Collection holding live seat subscriptions.
pub const SECTIONS_TRACKED: &str = "sections_tracked";
/// Collection holding one consolidated subscription per term and CRN.
pub const SECTIONS_ARCHIVE: &str = "sections_archive";

/// Capabilities the crate needs from a document database.
pub trait DocumentStore {
    /// Returns every document in `collection` whose string fields equal all
    /// of the given `(field, value)` pairs, in a stable order.
    fn find_by_equality(
        &self,
        collection: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<Document>, StoreError>;

    /// Fetches one document, `None` if it does not exist.
    fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError>;

    /// Shallow merge: top-level fields in `fields` replace the stored ones,
    /// all others are left alone. Creates the document if it is missing.
    fn set_merge(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError>;

    /// Adds a new document under a generated id.
    fn add(&self, collection: &str, fields: Fields) -> Result<DocumentRef, StoreError>;

    /// Deletes a document. Deleting a missing document is not an error.
    fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError>;
}
