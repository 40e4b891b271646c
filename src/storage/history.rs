//! Append-only generation history in SQLite

use crate::error::{Error, Result};
use crate::models::{ArtifactType, GenerationRecord};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS generation_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    generated_at TEXT NOT NULL,
    client_id TEXT,
    requirement_filename TEXT NOT NULL,
    counts TEXT NOT NULL,
    failed TEXT NOT NULL,
    model TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_generation_history_client ON generation_history(client_id);";

fn db_error(err: rusqlite::Error) -> Error {
    Error::persistence("History database error", err)
}

/// Generation records; rows are only ever inserted
#[derive(Debug)]
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::persistence(&format!("Cannot create {}", parent.display()), e))?;
        }
        let conn = Connection::open(path).map_err(db_error)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_error)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("history store lock poisoned".to_string()))
    }

    /// Stores a record and returns it with its row id
    pub fn append(&self, record: &GenerationRecord) -> Result<GenerationRecord> {
        let counts = serde_json::to_string(&record.counts)
            .map_err(|e| Error::persistence("Failed to serialize history counts", e))?;
        let failed = serde_json::to_string(&record.failed)
            .map_err(|e| Error::persistence("Failed to serialize history failures", e))?;

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO generation_history
                (generated_at, client_id, requirement_filename, counts, failed, model)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.generated_at.to_rfc3339(),
                record.client_id,
                record.requirement_filename,
                counts,
                failed,
                record.model,
            ],
        )
        .map_err(db_error)?;

        let mut stored = record.clone();
        stored.id = Some(conn.last_insert_rowid());
        debug!("📝 History record {} appended", conn.last_insert_rowid());
        Ok(stored)
    }

    /// Newest first, optionally for one client
    pub fn list(&self, client_id: Option<&str>, limit: usize) -> Result<Vec<GenerationRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, generated_at, client_id, requirement_filename, counts, failed, model
                 FROM generation_history
                 WHERE ?1 IS NULL OR client_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .map_err(db_error)?;

        let rows = stmt
            .query_map(params![client_id, limit as i64], Self::read_row)
            .map_err(db_error)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    pub fn get(&self, id: i64) -> Result<Option<GenerationRecord>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id, generated_at, client_id, requirement_filename, counts, failed, model
             FROM generation_history WHERE id = ?1",
            params![id],
            Self::read_row,
        )
        .optional()
        .map_err(db_error)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM generation_history", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count as usize)
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<GenerationRecord> {
        let generated_at: String = row.get(1)?;
        let counts: String = row.get(4)?;
        let failed: String = row.get(5)?;

        let generated_at = DateTime::parse_from_rfc3339(&generated_at)
            .map(|dt| dt.with_timezone(&Local))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
            })?;
        let counts: BTreeMap<ArtifactType, usize> = serde_json::from_str(&counts).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let failed: Vec<ArtifactType> = serde_json::from_str(&failed).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(GenerationRecord {
            id: Some(row.get(0)?),
            generated_at,
            client_id: row.get(2)?,
            requirement_filename: row.get(3)?,
            counts,
            failed,
            model: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(client: Option<&str>, manual: usize) -> GenerationRecord {
        GenerationRecord {
            id: None,
            generated_at: Local::now(),
            client_id: client.map(str::to_string),
            requirement_filename: "login.txt".to_string(),
            counts: BTreeMap::from([(ArtifactType::Manual, manual)]),
            failed: vec![ArtifactType::Gherkin],
            model: "ollama/qwen2.5:7b".to_string(),
        }
    }

    #[test]
    fn test_append_and_list_newest_first() {
        let store = HistoryStore::open_in_memory().unwrap();
        let first = store.append(&record(Some("acme0001"), 3)).unwrap();
        store.append(&record(None, 5)).unwrap();
        assert!(first.id.is_some());

        let all = store.list(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].total(), 5);
        assert_eq!(all[1].failed, vec![ArtifactType::Gherkin]);

        let acme = store.list(Some("acme0001"), 10).unwrap();
        assert_eq!(acme.len(), 1);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get(first.id.unwrap()).unwrap().unwrap().total(), 3);
    }

    #[test]
    fn test_list_limit() {
        let store = HistoryStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.append(&record(None, i)).unwrap();
        }
        assert_eq!(store.list(None, 2).unwrap().len(), 2);
    }
}
