//! SQLite-backed status log.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::Connection;
use uuid::Uuid;

/// Most records returned by [`StatusStore::list`].
pub const LIST_LIMIT: usize = 1000;

const INSERT: &str =
    "INSERT INTO status_checks (id, client_name, timestamp) VALUES (?1, ?2, ?3)";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS status_checks (
    id TEXT PRIMARY KEY,
    client_name TEXT NOT NULL,
    timestamp TEXT NOT NULL
)";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: String,
    pub client_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StatusStore {
    conn: Connection,
}

impl StatusStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "status store opened");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute(SCHEMA, [])?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    pub async fn insert(&self, client_name: String) -> Result<StatusRecord, StoreError> {
        let record = StatusRecord {
            id: Uuid::new_v4().to_string(),
            client_name,
            // Stored with microsecond precision.
            timestamp: Utc::now().trunc_subsecs(6),
        };
        let row = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    INSERT,
                    (
                        &row.id,
                        &row.client_name,
                        row.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                    ),
                )?;
                Ok(())
            })
            .await?;
        tracing::debug!(id = %record.id, client = %record.client_name, "status record stored");
        Ok(record)
    }

    /// Up to [`LIST_LIMIT`] records, oldest first.
    pub async fn list(&self) -> Result<Vec<StatusRecord>, StoreError> {
        let records = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, client_name, timestamp FROM status_checks ORDER BY rowid LIMIT ?1",
                )?;
                let rows = stmt.query_map([LIST_LIMIT as i64], |row| {
                    let raw: String = row.get(2)?;
                    let timestamp = DateTime::parse_from_rfc3339(&raw)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                        })?
                        .with_timezone(&Utc);
                    Ok(StatusRecord {
                        id: row.get(0)?,
                        client_name: row.get(1)?,
                        timestamp,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, rusqlite::Error>>()?)
            })
            .await?;
        Ok(records)
    }

    /// Close the connection. Other clones of this store fail afterwards.
    pub async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await?;
        tracing::info!("status store closed");
        Ok(())
    }
}
