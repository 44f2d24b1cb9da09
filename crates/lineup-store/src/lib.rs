//! lineup-store — SQLite-backed person records.
//!
//! Records are looked up by `name_key`, the normalized form of the name
//! (see [`lineup_core::normalize_key`]), so gallery identifiers resolve
//! regardless of case or spacing.

use chrono::NaiveDate;
use lineup_core::{normalize_key, PersonRecord, RecordLookupError, RecordStore};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL,
    crimes TEXT NOT NULL,
    status TEXT NOT NULL,
    last_known_address TEXT NOT NULL,
    release_date TEXT
);
CREATE INDEX IF NOT EXISTS records_name_key ON records(name_key);
";

const SELECT_COLUMNS: &str =
    "SELECT name, age, gender, crimes, status, last_known_address, release_date FROM records";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;
        tracing::debug!(path = %path.display(), "record store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create the `records` table and index if missing. Idempotent.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert a record, returning its row id.
    pub fn insert(&self, record: &PersonRecord) -> Result<i64, StoreError> {
        let key = normalize_key(&record.name.replace('_', " "));
        if key.is_empty() {
            return Err(StoreError::InvalidRecord("name is empty".into()));
        }
        self.conn.execute(
            "INSERT INTO records (name, name_key, age, gender, crimes, status, last_known_address, release_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.name,
                key,
                record.age,
                record.gender,
                record.crimes.join(", "),
                record.status,
                record.last_known_address,
                record.release_date,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(id, name_key = %key, "record inserted");
        Ok(id)
    }

    /// All records in insertion order.
    pub fn list(&self) -> Result<Vec<PersonRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// First record (lowest id) whose normalized name equals `key`.
    pub fn find(&self, key: &str) -> Result<Option<PersonRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE name_key = ?1 ORDER BY id LIMIT 1"),
                params![normalize_key(key)],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }
}

impl RecordStore for SqliteRecordStore {
    fn find_by_normalized_key(&self, key: &str) -> Result<Option<PersonRecord>, RecordLookupError> {
        self.find(key).map_err(|e| RecordLookupError(e.to_string()))
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PersonRecord> {
    let crimes: String = row.get(3)?;
    let release_date: Option<NaiveDate> = row.get(6)?;
    Ok(PersonRecord {
        name: row.get(0)?,
        age: row.get(1)?,
        gender: row.get(2)?,
        crimes: split_crimes(&crimes),
        status: row.get(4)?,
        last_known_address: row.get(5)?,
        release_date,
    })
}

fn split_crimes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, crimes: &[&str], release: Option<NaiveDate>) -> PersonRecord {
        PersonRecord {
            name: name.into(),
            age: 20,
            gender: "Female".into(),
            crimes: crimes.iter().map(|c| c.to_string()).collect(),
            status: "In jail".into(),
            last_known_address: "Model Town, Haridwar, Uttarakhand".into(),
            release_date: release,
        }
    }

    #[test]
    fn test_insert_and_find_normalized() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let r = record("Siddhi Tuli", &["Fraud", "Identity Theft"], None);
        store.insert(&r).unwrap();

        assert_eq!(store.find("siddhi tuli").unwrap(), Some(r.clone()));
        assert_eq!(store.find_by_normalized_key("  SIDDHI   tuli ").unwrap(), Some(r));
        assert_eq!(store.find("siddhi").unwrap(), None);
    }

    #[test]
    fn test_underscored_name_matches_gallery_identifier() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.insert(&record("sachin_kumar", &["Robbery"], None)).unwrap();
        assert!(store.find("sachin kumar").unwrap().is_some());
    }

    #[test]
    fn test_release_date_roundtrip() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 9, 15);
        store.insert(&record("shashwat singh kushwah", &["Murder", "Smuggling"], date)).unwrap();
        let found = store.find("shashwat singh kushwah").unwrap().unwrap();
        assert_eq!(found.release_date, date);
        assert_eq!(found.crimes, vec!["Murder", "Smuggling"]);
    }

    #[test]
    fn test_duplicates_resolve_to_first() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let mut first = record("eve", &["Fraud"], None);
        first.age = 30;
        store.insert(&first).unwrap();
        store.insert(&record("Eve", &["Arson"], None)).unwrap();
        assert_eq!(store.find("eve").unwrap().unwrap().age, 30);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        assert!(matches!(
            store.insert(&record("   ", &[], None)),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_list_in_insertion_order() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.insert(&record("b", &[], None)).unwrap();
        store.insert(&record("a", &[], None)).unwrap();
        let names: Vec<String> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_open_creates_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/records.db");
        {
            let store = SqliteRecordStore::open(&path).unwrap();
            store.insert(&record("alice", &["Theft"], None)).unwrap();
        }
        let store = SqliteRecordStore::open(&path).unwrap();
        store.init_schema().unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_split_crimes() {
        assert_eq!(split_crimes("Fraud, Identity Theft,"), vec!["Fraud", "Identity Theft"]);
        assert!(split_crimes("").is_empty());
    }
}
