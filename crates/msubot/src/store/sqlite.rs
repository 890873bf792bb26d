/// SQLite-backed document store
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{Document, DocumentRef, DocumentStore, Fields, StoreError};

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_documents.sql");

/// Length of ids handed out by [`DocumentStore::add`].
const GENERATED_ID_LEN: usize = 20;

/// Stores every collection in one `documents` table, one JSON object per row.
pub struct SqliteDocumentStore {
    db: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Opens (or creates) a database file and initializes the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path).map_err(|e| StoreError::Unavailable {
            message: format!("Failed to open database {}: {}", db_path.display(), e),
        })?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable {
            message: format!("Failed to open in-memory database: {}", e),
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::Unavailable {
                message: format!("Failed to initialize database schema: {}", e),
            })?;

        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Unavailable {
            message: "database lock poisoned".to_string(),
        })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn find_by_equality(
        &self,
        collection: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<Document>, StoreError> {
        let target = describe_query(collection, filters);

        let mut sql = String::from("SELECT doc_id, body FROM documents WHERE collection = ?1");
        let mut args = vec![collection.to_string()];
        for (field, value) in filters {
            sql.push_str(&format!(
                " AND json_extract(body, ?{}) = ?{}",
                args.len() + 1,
                args.len() + 2
            ));
            args.push(json_path(field));
            args.push(value.to_string());
        }
        sql.push_str(" ORDER BY rowid");

        let db = self.conn()?;
        let mut stmt = db
            .prepare(&sql)
            .map_err(|e| StoreError::read("query", &target, e))?;

        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StoreError::read("query", &target, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::read("query", &target, e))?;

        rows.into_iter()
            .map(|(id, body)| decode_body(DocumentRef::new(collection, id), &body))
            .collect()
    }

    fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        let db = self.conn()?;
        let body: Option<String> = db
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2",
                params![doc.collection, doc.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::read("get", doc, e))?;

        body.map(|body| decode_body(doc.clone(), &body)).transpose()
    }

    fn set_merge(&self, doc: &DocumentRef, fields: Fields) -> Result<(), StoreError> {
        let mut db = self.conn()?;
        let tx = db
            .transaction()
            .map_err(|e| StoreError::write("merge", doc, e))?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2",
                params![doc.collection, doc.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::write("merge", doc, e))?;

        let now = Utc::now().to_rfc3339();
        let written = match existing {
            Some(body) => {
                let mut merged = decode_body(doc.clone(), &body)?.fields;
                merged.extend(fields);
                tx.execute(
                    "UPDATE documents SET body = ?1, updated_at = ?2
                     WHERE collection = ?3 AND doc_id = ?4",
                    params![Value::Object(merged).to_string(), now, doc.collection, doc.id],
                )
            }
            None => tx.execute(
                "INSERT INTO documents (collection, doc_id, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![doc.collection, doc.id, Value::Object(fields).to_string(), now],
            ),
        };
        written.map_err(|e| StoreError::write("merge", doc, e))?;

        tx.commit().map_err(|e| StoreError::write("merge", doc, e))
    }

    fn add(&self, collection: &str, fields: Fields) -> Result<DocumentRef, StoreError> {
        let doc = DocumentRef::new(collection, generate_id());
        let now = Utc::now().to_rfc3339();

        let db = self.conn()?;
        db.execute(
            "INSERT INTO documents (collection, doc_id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![doc.collection, doc.id, Value::Object(fields).to_string(), now],
        )
        .map_err(|e| StoreError::write("add", &doc, e))?;

        debug!(document = %doc, "Added document");
        Ok(doc)
    }

    fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        let db = self.conn()?;
        db.execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
            params![doc.collection, doc.id],
        )
        .map_err(|e| StoreError::write("delete", doc, e))?;
        Ok(())
    }
}

/// JSON path selecting a top-level field, quoted so any label is literal.
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

/// Describes a query for error messages, e.g. `sections_archive[term == F24]`.
fn describe_query(collection: &str, filters: &[(&str, &str)]) -> String {
    let conditions: Vec<String> = filters
        .iter()
        .map(|(field, value)| format!("{} == {}", field, value))
        .collect();
    format!("{}[{}]", collection, conditions.join(", "))
}

fn decode_body(reference: DocumentRef, body: &str) -> Result<Document, StoreError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(Document { reference, fields }),
        Ok(_) => Err(StoreError::DataShape {
            document: reference.to_string(),
            message: "stored body is not a JSON object".to_string(),
        }),
        Err(e) => Err(StoreError::DataShape {
            document: reference.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Generates a random alphanumeric document id.
fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}
