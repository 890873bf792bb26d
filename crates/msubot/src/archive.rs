//! Moves finished subscriptions from `sections_tracked` into `sections_archive`.
//!
//! The store gives no transaction across documents, so the only guarantee is
//! ordering: the tracked document is deleted only after the archive write has
//! succeeded. A failure at any step leaves the tracked document in place and
//! the migration can be retried. Only the merge path reads `users`; the
//! create path copies the tracked document as it is.
//!
//! A retry after a lost acknowledgement appends the same users to the archive
//! a second time; users are not deduplicated.

use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::store::{
    DocumentRef, DocumentStore, Fields, StoreError, Subscription, SECTIONS_ARCHIVE,
    SECTIONS_TRACKED,
};

/// Errors that can occur while archiving a tracked subscription.
#[derive(Debug, Error, Clone)]
pub enum MigrationError {
    /// The tracked document named by the caller does not exist
    #[error("Tracked subscription {id} does not exist")]
    TrackedNotFound { id: String },

    /// A store call failed or a document had the wrong shape
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrationError {
    /// Returns true if the migration may succeed when run again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigrationError::Store(e) if e.is_retryable())
    }
}

/// What a successful migration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Users were appended to an existing archive document
    Merged {
        archive: DocumentRef,
        users_added: usize,
        /// Extra archive documents found for the same term and CRN (left as
        /// is); non-zero whenever the duplicate warning was logged
        duplicate_archives: usize,
    },
    /// No archive document existed; the tracked document was copied
    Created { archive: DocumentRef },
}

impl MigrationOutcome {
    /// The archive document that now holds the users.
    pub fn archive(&self) -> &DocumentRef {
        match self {
            MigrationOutcome::Merged { archive, .. } | MigrationOutcome::Created { archive } => {
                archive
            }
        }
    }
}

/// Archives one tracked subscription.
///
/// # Arguments
/// * `store` - The document store
/// * `crn` - CRN of the section
/// * `tracked_id` - Id of the document in `sections_tracked`
/// * `term` - Term of the section
///
/// # Returns
/// * `Ok(MigrationOutcome)` - The tracked document is gone and its users are archived
/// * `Err(MigrationError)` - Nothing was deleted; at most the archive write happened
pub fn move_tracked_section<S: DocumentStore + ?Sized>(
    store: &S,
    crn: &str,
    tracked_id: &str,
    term: &str,
) -> Result<MigrationOutcome, MigrationError> {
    let migration_id = generate_migration_id();
    info!(
        migration_id = %migration_id,
        term = %term,
        crn = %crn,
        tracked_id = %tracked_id,
        "Archiving tracked section"
    );

    let matches = store
        .find_by_equality(SECTIONS_ARCHIVE, &[("term", term), ("crn", crn)])
        .map_err(log_failure(&migration_id, "find archive documents"))?;

    let tracked_ref = DocumentRef::new(SECTIONS_TRACKED, tracked_id);
    let tracked = store
        .get(&tracked_ref)
        .map_err(log_failure(&migration_id, "get tracked document"))?
        .ok_or_else(|| {
            error!(
                migration_id = %migration_id,
                document = %tracked_ref,
                "Tracked document not found"
            );
            MigrationError::TrackedNotFound {
                id: tracked_id.to_string(),
            }
        })?;

    let outcome = match matches.split_first() {
        Some((target, rest)) => {
            if !rest.is_empty() {
                let ids: Vec<&str> = matches.iter().map(|d| d.reference.id.as_str()).collect();
                warn!(
                    migration_id = %migration_id,
                    term = %term,
                    crn = %crn,
                    ids = ?ids,
                    "Duplicate archive documents, merging into the first"
                );
            }

            let archived: Subscription = target
                .decode()
                .map_err(log_failure(&migration_id, "read archived users"))?;
            let moving: Subscription = tracked
                .decode()
                .map_err(log_failure(&migration_id, "read tracked users"))?;

            let users_added = moving.users.len();
            let mut users = archived.users;
            users.extend(moving.users);

            let mut update = Fields::new();
            update.insert("users".to_string(), Value::Array(users));
            store
                .set_merge(&target.reference, update)
                .map_err(log_failure(&migration_id, "append users to archive"))?;

            MigrationOutcome::Merged {
                archive: target.reference.clone(),
                users_added,
                duplicate_archives: rest.len(),
            }
        }
        None => {
            let archive = store
                .add(SECTIONS_ARCHIVE, tracked.fields.clone())
                .map_err(log_failure(&migration_id, "create archive document"))?;

            MigrationOutcome::Created { archive }
        }
    };

    store
        .delete(&tracked_ref)
        .map_err(log_failure(&migration_id, "delete tracked document"))?;

    info!(
        migration_id = %migration_id,
        archive = %outcome.archive(),
        "Archived tracked section"
    );
    Ok(outcome)
}

/// Logs a failed step before it is returned to the caller.
fn log_failure<'a>(
    migration_id: &'a str,
    step: &'static str,
) -> impl Fn(StoreError) -> StoreError + 'a {
    move |e: StoreError| {
        error!(migration_id = %migration_id, step = step, error = %e, "Archive step failed");
        e
    }
}

/// Generates a unique id so every log line of one migration can be grouped.
fn generate_migration_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, SqliteDocumentStore};
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    /// Wraps a real store and fails selected calls.
    struct FlakyStore {
        inner: SqliteDocumentStore,
        fail_archive_writes: bool,
        fail_deletes: bool,
    }

    impl FlakyStore {
        fn new(inner: SqliteDocumentStore) -> Self {
            Self {
                inner,
                fail_archive_writes: false,
                fail_deletes: false,
            }
        }
    }

    impl DocumentStore for FlakyStore {
        fn find_by_equality(
            &self,
            collection: &str,
            filters: &[(&str, &str)],
        ) -> Result<Vec<Document>, StoreError> {
            self.inner.find_by_equality(collection, filters)
        }

        fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
            self.inner.get(doc)
        }

        fn set_merge(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
            if self.fail_archive_writes && doc.collection == SECTIONS_ARCHIVE {
                return Err(StoreError::write("merge", doc, "deadline exceeded"));
            }
            self.inner.set_merge(doc, fields)
        }

        fn add(&self, collection: &str, fields: Fields) -> Result<DocumentRef, StoreError> {
            if self.fail_archive_writes && collection == SECTIONS_ARCHIVE {
                return Err(StoreError::write("add", collection, "deadline exceeded"));
            }
            self.inner.add(collection, fields)
        }

        fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
            if self.fail_deletes {
                return Err(StoreError::write("delete", doc, "deadline exceeded"));
            }
            self.inner.delete(doc)
        }
    }

    fn track(store: &impl DocumentStore, id: &str, value: Value) -> DocumentRef {
        let doc = DocumentRef::new(SECTIONS_TRACKED, id);
        store.set_merge(&doc, fields(value)).unwrap();
        doc
    }

    fn archives(store: &impl DocumentStore) -> Vec<Document> {
        store
            .find_by_equality(SECTIONS_ARCHIVE, &[("term", "F24"), ("crn", "222")])
            .unwrap()
    }

    #[test]
    fn test_create_path() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let tracked = track(
            &store,
            "t1",
            json!({"term": "F24", "crn": "222", "users": ["u1"], "department": "CSCI"}),
        );

        let outcome = move_tracked_section(&store, "222", "t1", "F24").unwrap();
        assert!(matches!(outcome, MigrationOutcome::Created { .. }));

        let archived = archives(&store);
        assert_eq!(archived.len(), 1);
        assert_eq!(&archived[0].reference, outcome.archive());
        assert_eq!(
            Value::Object(archived[0].fields.clone()),
            json!({"term": "F24", "crn": "222", "users": ["u1"], "department": "CSCI"})
        );
        assert!(store.get(&tracked).unwrap().is_none());
    }

    #[test]
    fn test_merge_path_appends_archive_first() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let archive = store
            .add(
                SECTIONS_ARCHIVE,
                fields(json!({"term": "F24", "crn": "222", "users": ["u1"]})),
            )
            .unwrap();
        let tracked = track(&store, "t1", json!({"users": ["u2"]}));

        let outcome = move_tracked_section(&store, "222", "t1", "F24").unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Merged {
                archive: archive.clone(),
                users_added: 1,
                duplicate_archives: 0,
            }
        );

        let merged = store.get(&archive).unwrap().unwrap();
        assert_eq!(merged.fields.get("users"), Some(&json!(["u1", "u2"])));
        assert_eq!(merged.fields.get("term"), Some(&json!("F24")));
        assert!(store.get(&tracked).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_archives_reported_and_merged_into_first() {
        // The warning is surfaced to callers through `duplicate_archives`.
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let first = store
            .add(
                SECTIONS_ARCHIVE,
                fields(json!({"term": "F24", "crn": "222", "users": ["u1"]})),
            )
            .unwrap();
        let second = store
            .add(
                SECTIONS_ARCHIVE,
                fields(json!({"term": "F24", "crn": "222", "users": ["u9"]})),
            )
            .unwrap();
        track(&store, "t1", json!({"term": "F24", "crn": "222", "users": ["u2"]}));

        let outcome = move_tracked_section(&store, "222", "t1", "F24").unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome::Merged {
                archive: first.clone(),
                users_added: 1,
                duplicate_archives: 1,
            }
        );

        let first = store.get(&first).unwrap().unwrap();
        let second = store.get(&second).unwrap().unwrap();
        assert_eq!(first.fields.get("users"), Some(&json!(["u1", "u2"])));
        assert_eq!(second.fields.get("users"), Some(&json!(["u9"])));
    }

    #[test]
    fn test_failed_merge_keeps_tracked_document() {
        let inner = SqliteDocumentStore::open_in_memory().unwrap();
        inner
            .add(
                SECTIONS_ARCHIVE,
                fields(json!({"term": "F24", "crn": "222", "users": ["u1"]})),
            )
            .unwrap();
        let mut store = FlakyStore::new(inner);
        store.fail_archive_writes = true;
        let tracked = track(&store, "t1", json!({"users": ["u2"]}));

        let err = move_tracked_section(&store, "222", "t1", "F24").unwrap_err();
        assert!(matches!(err, MigrationError::Store(StoreError::Write { .. })));
        assert!(err.is_retryable());

        assert!(store.get(&tracked).unwrap().is_some());
        assert_eq!(archives(&store)[0].fields.get("users"), Some(&json!(["u1"])));
    }

    #[test]
    fn test_failed_create_keeps_tracked_document() {
        let mut store = FlakyStore::new(SqliteDocumentStore::open_in_memory().unwrap());
        store.fail_archive_writes = true;
        let tracked = track(&store, "t1", json!({"term": "F24", "crn": "222", "users": ["u1"]}));

        assert!(move_tracked_section(&store, "222", "t1", "F24").is_err());
        assert!(store.get(&tracked).unwrap().is_some());
        assert!(archives(&store).is_empty());
    }

    #[test]
    fn test_failed_delete_leaves_both_and_retry_duplicates_users() {
        let mut store = FlakyStore::new(SqliteDocumentStore::open_in_memory().unwrap());
        store.fail_deletes = true;
        let tracked = track(&store, "t1", json!({"term": "F24", "crn": "222", "users": ["u1"]}));

        assert!(move_tracked_section(&store, "222", "t1", "F24").is_err());
        assert!(store.get(&tracked).unwrap().is_some());
        assert_eq!(archives(&store).len(), 1);

        // Users are not deduplicated, so a retry repeats them.
        store.fail_deletes = false;
        move_tracked_section(&store, "222", "t1", "F24").unwrap();
        let archived = archives(&store);
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].fields.get("users"), Some(&json!(["u1", "u1"])));
        assert!(store.get(&tracked).unwrap().is_none());
    }

    #[test]
    fn test_missing_tracked_document() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let err = move_tracked_section(&store, "222", "gone", "F24").unwrap_err();
        assert!(matches!(err, MigrationError::TrackedNotFound { ref id } if id == "gone"));
        assert!(!err.is_retryable());
        assert!(archives(&store).is_empty());
    }

    #[test]
    fn test_malformed_archive_users_is_fatal() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let archive = store
            .add(
                SECTIONS_ARCHIVE,
                fields(json!({"term": "F24", "crn": "222", "users": "u1"})),
            )
            .unwrap();
        let tracked = track(&store, "t1", json!({"users": ["u2"]}));

        let err = move_tracked_section(&store, "222", "t1", "F24").unwrap_err();
        assert!(matches!(err, MigrationError::Store(StoreError::DataShape { .. })));
        assert!(!err.is_retryable());
        assert!(store.get(&tracked).unwrap().is_some());
        assert_eq!(
            store.get(&archive).unwrap().unwrap().fields.get("users"),
            Some(&json!("u1"))
        );
    }

    #[test]
    fn test_malformed_tracked_users_is_fatal_when_merging() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let archive = store
            .add(
                SECTIONS_ARCHIVE,
                fields(json!({"term": "F24", "crn": "222", "users": ["u1"]})),
            )
            .unwrap();
        let tracked = track(&store, "t1", json!({"term": "F24", "crn": "222", "users": {"a": 1}}));

        let err = move_tracked_section(&store, "222", "t1", "F24").unwrap_err();
        assert!(matches!(err, MigrationError::Store(StoreError::DataShape { .. })));
        assert!(store.get(&tracked).unwrap().is_some());
        assert_eq!(
            store.get(&archive).unwrap().unwrap().fields.get("users"),
            Some(&json!(["u1"]))
        );
    }

    #[test]
    fn test_create_copies_tracked_document_without_users() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let tracked = track(&store, "t1", json!({"term": "F24", "crn": "222", "uid": "u1"}));

        let outcome = move_tracked_section(&store, "222", "t1", "F24").unwrap();
        assert!(matches!(outcome, MigrationOutcome::Created { .. }));

        let archived = archives(&store);
        assert_eq!(archived.len(), 1);
        assert_eq!(
            Value::Object(archived[0].fields.clone()),
            json!({"term": "F24", "crn": "222", "uid": "u1"})
        );
        assert!(store.get(&tracked).unwrap().is_none());
    }

    #[test]
    fn test_merge_accepts_numeric_tracked_crn() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let archive = store
            .add(
                SECTIONS_ARCHIVE,
                fields(json!({"term": "F24", "crn": "222", "users": ["u1"]})),
            )
            .unwrap();
        let tracked = track(&store, "t1", json!({"term": "F24", "crn": 222, "users": ["u2"]}));

        let outcome = move_tracked_section(&store, "222", "t1", "F24").unwrap();
        assert_eq!(outcome.archive(), &archive);

        let merged = store.get(&archive).unwrap().unwrap();
        assert_eq!(merged.fields.get("users"), Some(&json!(["u1", "u2"])));
        assert!(store.get(&tracked).unwrap().is_none());
    }
}
