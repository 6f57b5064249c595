// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheDb, CacheError};
use crate::stream::{StreamEntry, StreamStore};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

/// Which stream partition a [`StreamCache`] reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTable {
    /// Posts already scrolled into view
    Read,
    /// Posts newer than the read stream's head, not yet merged
    Unread,
}

impl StreamTable {
    fn name(self) -> &'static str {
        match self {
            Self::Read => "post_streams",
            Self::Unread => "unread_post_streams",
        }
    }
}

/// Cache operations for post streams
#[derive(Clone)]
pub struct StreamCache {
    db: CacheDb,
    table: StreamTable,
}

impl StreamCache {
    pub fn new(db: &CacheDb, table: StreamTable) -> Self {
        Self {
            db: db.clone(),
            table,
        }
    }

    /// Get the ordered ids stored for a stream
    pub fn get(&self, stream_id: &str) -> Result<Option<StreamEntry>, CacheError> {
        let conn = self.db.conn()?;
        Self::select(&conn, self.table, stream_id)
    }

    /// Replace the ids stored for a stream
    pub fn store(&self, stream_id: &str, ids: &[String]) -> Result<(), CacheError> {
        let conn = self.db.conn()?;
        Self::write(&conn, self.table, stream_id, ids)
    }

    /// Remove a stream entirely
    pub fn delete(&self, stream_id: &str) -> Result<(), CacheError> {
        let conn = self.db.conn()?;
        Self::remove(&conn, self.table, stream_id)
    }

    /// Number of streams stored in this partition
    pub fn count(&self) -> Result<usize, CacheError> {
        let conn = self.db.conn()?;

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table.name()),
            [],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    fn select(
        conn: &Connection,
        table: StreamTable,
        stream_id: &str,
    ) -> Result<Option<StreamEntry>, CacheError> {
        let stream_json: Option<String> = conn
            .query_row(
                &format!("SELECT stream_json FROM {} WHERE id = ?", table.name()),
                [stream_id],
                |row| row.get(0),
            )
            .optional()?;

        match stream_json {
            Some(json) => Ok(Some(StreamEntry {
                id: stream_id.to_string(),
                stream: serde_json::from_str(&json)?,
            })),
            None => Ok(None),
        }
    }

    fn write(
        conn: &Connection,
        table: StreamTable,
        stream_id: &str,
        ids: &[String],
    ) -> Result<(), CacheError> {
        let stream_json = serde_json::to_string(ids)?;

        conn.execute(
            &format!(
                r#"
                INSERT INTO {} (id, stream_json, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    stream_json = excluded.stream_json,
                    updated_at = excluded.updated_at
                "#,
                table.name()
            ),
            params![stream_id, stream_json, CacheDb::now()],
        )?;

        Ok(())
    }

    fn remove(conn: &Connection, table: StreamTable, stream_id: &str) -> Result<(), CacheError> {
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", table.name()),
            [stream_id],
        )?;
        Ok(())
    }
}

#[async_trait]
impl StreamStore for StreamCache {
    async fn find_by_id(&self, stream_id: &str) -> Result<Option<StreamEntry>, CacheError> {
        let (table, stream_id) = (self.table, stream_id.to_string());
        self.db
            .run(move |conn| Self::select(conn, table, &stream_id))
            .await
    }

    async fn upsert(&self, stream_id: &str, ids: Vec<String>) -> Result<(), CacheError> {
        let (table, stream_id) = (self.table, stream_id.to_string());
        self.db
            .run(move |conn| Self::write(conn, table, &stream_id, &ids))
            .await
    }

    async fn delete_by_id(&self, stream_id: &str) -> Result<(), CacheError> {
        let (table, stream_id) = (self.table, stream_id.to_string());
        self.db
            .run(move |conn| Self::remove(conn, table, &stream_id))
            .await
    }
}
