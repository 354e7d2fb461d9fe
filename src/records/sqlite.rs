//! SQLite-backed record store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use serde_json::Number;

use super::store::{new_record_id, Address, Example, ExampleRecord, RecordStore};

/// Record store backed by a single SQLite database file.
pub struct SqliteRecordStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the examples table if it does not already exist.
    /// Idempotent -- safe to call on every startup.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS examples (
                id       TEXT PRIMARY KEY,
                name     TEXT NOT NULL,
                email    TEXT NOT NULL,
                age      TEXT,
                address  TEXT
            );
            ",
        )?;
        Ok(())
    }
}

fn encode_address(address: &Option<Address>) -> anyhow::Result<Option<String>> {
    address
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

/// Numbers are stored as their JSON literal so `85` does not come back as `85.0`.
fn encode_number(number: &Option<Number>) -> Option<String> {
    number.as_ref().map(Number::to_string)
}

fn decode_json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|json| serde_json::from_str::<T>(&json))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ExampleRecord> {
    Ok(ExampleRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        age: decode_json_column::<Number>(row, 3)?,
        address: decode_json_column::<Address>(row, 4)?,
    })
}

impl RecordStore for SqliteRecordStore {
    fn create(
        &self,
        example: Example,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExampleRecord>> + Send + '_>> {
        Box::pin(async move {
            let record = ExampleRecord::from_example(new_record_id(), example);
            let age = encode_number(&record.age);
            let address = encode_address(&record.address)?;
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO examples (id, name, email, age, address) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![record.id, record.name, record.email, age, address],
            )?;
            Ok(record)
        })
    }

    fn get(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ExampleRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let record = conn
                .query_row(
                    "SELECT id, name, email, age, address FROM examples WHERE id = ?1",
                    params![id],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
    }

    fn update(
        &self,
        record: ExampleRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        Box::pin(async move {
            let age = encode_number(&record.age);
            let address = encode_address(&record.address)?;
            let conn = self.conn.lock().expect("mutex poisoned");
            let changed = conn.execute(
                "UPDATE examples SET name = ?2, email = ?3, age = ?4, address = ?5 WHERE id = ?1",
                params![record.id, record.name, record.email, age, address],
            )?;
            Ok(changed > 0)
        })
    }

    fn delete(&self, id: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let changed = conn.execute("DELETE FROM examples WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteRecordStore {
        SqliteRecordStore::new(":memory:").expect("failed to create in-memory store")
    }

    fn make_example(name: &str) -> Example {
        Example {
            name: name.to_string(),
            age: Some(41.into()),
            email: format!("{name}@example.com"),
            address: Some(Address {
                street: Some("1 Main St".to_string()),
                city: Some("Springfield".to_string()),
                state: Some("IL".to_string()),
                zip: Some(62701.into()),
            }),
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let store = test_store();
        store.init_db().unwrap();
        store.init_db().unwrap();
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let store = test_store();
        let created = store.create(make_example("homer")).await.unwrap();
        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.address.unwrap().zip, Some(62701.into()));
    }

    #[tokio::test]
    async fn test_optional_fields_stored_as_null() {
        let store = test_store();
        let created = store
            .create(Example {
                name: "bart".into(),
                age: None,
                email: "bart@example.com".into(),
                address: None,
            })
            .await
            .unwrap();
        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.age, None);
        assert_eq!(fetched.address, None);
    }

    #[tokio::test]
    async fn test_numbers_keep_their_form() {
        let store = test_store();
        let mut example = make_example("abe");
        example.age = Number::from_f64(82.5);
        let created = store.create(example).await.unwrap();
        let fetched = store.get(&created.id).await.unwrap().unwrap();
        let json = serde_json::to_value(&fetched).unwrap();
        assert_eq!(json["age"].to_string(), "82.5");
        assert_eq!(json["address"]["zip"].to_string(), "62701");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = test_store();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_existing_and_missing() {
        let store = test_store();
        let created = store.create(make_example("marge")).await.unwrap();

        let mut changed = created.clone();
        changed.email = "marge@springfield.example".to_string();
        changed.address = None;
        assert!(store.update(changed.clone()).await.unwrap());
        assert_eq!(store.get(&created.id).await.unwrap(), Some(changed));

        let ghost = ExampleRecord::from_example("ghost", make_example("ghost"));
        assert!(!store.update(ghost).await.unwrap());
        assert!(store.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_existing_and_missing() {
        let store = test_store();
        let created = store.create(make_example("lisa")).await.unwrap();
        assert!(store.delete(&created.id).await.unwrap());
        assert!(!store.delete(&created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let path = path.to_str().unwrap();

        let id = {
            let store = SqliteRecordStore::new(path).unwrap();
            store.create(make_example("maggie")).await.unwrap().id
        };

        let reopened = SqliteRecordStore::new(path).unwrap();
        let fetched = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "maggie");
    }
}
