// SPDX-License-Identifier: MPL-2.0

use crate::cache::{CacheDb, CacheError};
use crate::model::{
    PostCounts, PostDetails, PostKind, PostRecord, PostRelationships, PostTag,
};
use crate::stream::PostStore;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;

/// Ids per `IN (...)` lookup
const DETAILS_BATCH_SIZE: usize = 500;

/// Cache operations for posts
#[derive(Clone)]
pub struct PostCache {
    db: CacheDb,
}

impl PostCache {
    pub fn new(db: &CacheDb) -> Self {
        Self { db: db.clone() }
    }

    /// Store multiple posts in a transaction
    pub fn store_batch(&self, records: &[PostRecord]) -> Result<(), CacheError> {
        let mut conn = self.db.conn()?;
        Self::write_batch(&mut conn, records)
    }

    /// Get post details by composite id
    pub fn get_details(&self, id: &str) -> Result<Option<PostDetails>, CacheError> {
        let conn = self.db.conn()?;
        Self::select_details(&conn, id)
    }

    /// Get details for several ids; ids that are not cached are left out
    pub fn get_details_batch(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, PostDetails>, CacheError> {
        let conn = self.db.conn()?;
        Self::select_details_batch(&conn, ids)
    }

    pub fn get_counts(&self, id: &str) -> Result<PostCounts, CacheError> {
        let conn = self.db.conn()?;

        conn.query_row(
            "SELECT id, tags, unique_tags, replies, reposts FROM post_counts WHERE id = ?",
            [id],
            |row| {
                Ok(PostCounts {
                    id: row.get(0)?,
                    tags: row.get(1)?,
                    unique_tags: row.get(2)?,
                    replies: row.get(3)?,
                    reposts: row.get(4)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CacheError::NotFound,
            other => CacheError::Database(other),
        })
    }

    pub fn get_relationships(&self, id: &str) -> Result<PostRelationships, CacheError> {
        let conn = self.db.conn()?;

        let (replied, reposted, mentioned_json): (Option<String>, Option<String>, String) = conn
            .query_row(
                "SELECT replied, reposted, mentioned_json FROM post_relationships WHERE id = ?",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => CacheError::NotFound,
                other => CacheError::Database(other),
            })?;

        Ok(PostRelationships {
            id: id.to_string(),
            replied,
            reposted,
            mentioned: serde_json::from_str(&mentioned_json)?,
        })
    }

    pub fn get_tags(&self, id: &str) -> Result<Vec<PostTag>, CacheError> {
        let conn = self.db.conn()?;

        let tags_json: Option<String> = conn
            .query_row("SELECT tags_json FROM post_tags WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;

        match tags_json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_batch(conn: &mut Connection, records: &[PostRecord]) -> Result<(), CacheError> {
        let tx = conn.transaction()?;
        let now = CacheDb::now();

        for record in records {
            let details = &record.details;
            let attachments_json = serde_json::to_string(&details.attachments)?;

            tx.execute(
                r#"
                INSERT INTO post_details (
                    id, content, kind, uri, indexed_at, attachments_json, fetched_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    kind = excluded.kind,
                    uri = excluded.uri,
                    indexed_at = excluded.indexed_at,
                    attachments_json = excluded.attachments_json,
                    fetched_at = excluded.fetched_at
                "#,
                params![
                    details.id,
                    details.content,
                    details.kind.as_str(),
                    details.uri,
                    details.indexed_at,
                    attachments_json,
                    now,
                ],
            )?;

            let counts = &record.counts;
            tx.execute(
                r#"
                INSERT INTO post_counts (id, tags, unique_tags, replies, reposts)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    tags = excluded.tags,
                    unique_tags = excluded.unique_tags,
                    replies = excluded.replies,
                    reposts = excluded.reposts
                "#,
                params![
                    counts.id,
                    counts.tags,
                    counts.unique_tags,
                    counts.replies,
                    counts.reposts,
                ],
            )?;

            let relationships = &record.relationships;
            let mentioned_json = serde_json::to_string(&relationships.mentioned)?;
            tx.execute(
                r#"
                INSERT INTO post_relationships (id, replied, reposted, mentioned_json)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    replied = excluded.replied,
                    reposted = excluded.reposted,
                    mentioned_json = excluded.mentioned_json
                "#,
                params![
                    relationships.id,
                    relationships.replied,
                    relationships.reposted,
                    mentioned_json,
                ],
            )?;

            let tags_json = serde_json::to_string(&record.tags)?;
            tx.execute(
                r#"
                INSERT INTO post_tags (id, tags_json) VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET tags_json = excluded.tags_json
                "#,
                params![details.id, tags_json],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn select_details(conn: &Connection, id: &str) -> Result<Option<PostDetails>, CacheError> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, content, kind, uri, indexed_at, attachments_json
            FROM post_details
            WHERE id = ?
            "#,
        )?;

        let row = stmt.query_row([id], Self::row_to_details).optional()?;
        row.map(Self::decode_details).transpose()
    }

    /// Fetch several rows at once, keyed by id
    fn select_details_batch(
        conn: &Connection,
        ids: &[String],
    ) -> Result<HashMap<String, PostDetails>, CacheError> {
        let mut found = HashMap::new();

        // SQLite caps bound parameters per statement
        for chunk in ids.chunks(DETAILS_BATCH_SIZE) {
            let placeholders: Vec<_> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
            let query = format!(
                r#"
                SELECT id, content, kind, uri, indexed_at, attachments_json
                FROM post_details
                WHERE id IN ({})
                "#,
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&query)?;
            let params: Vec<&dyn rusqlite::ToSql> =
                chunk.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

            let mut rows = stmt.query(params.as_slice())?;
            while let Some(row) = rows.next()? {
                let details = Self::decode_details(Self::row_to_details(row)?)?;
                found.insert(details.id.clone(), details);
            }
        }

        Ok(found)
    }

    /// Raw columns of a `post_details` row
    fn row_to_details(row: &rusqlite::Row) -> Result<RawDetails, rusqlite::Error> {
        Ok(RawDetails {
            id: row.get(0)?,
            content: row.get(1)?,
            kind: row.get(2)?,
            uri: row.get(3)?,
            indexed_at: row.get(4)?,
            attachments_json: row.get(5)?,
        })
    }

    fn decode_details(raw: RawDetails) -> Result<PostDetails, CacheError> {
        Ok(PostDetails {
            id: raw.id,
            content: raw.content,
            // Unknown kinds from older rows render as short posts
            kind: PostKind::parse(&raw.kind).unwrap_or_default(),
            uri: raw.uri,
            indexed_at: raw.indexed_at,
            attachments: serde_json::from_str(&raw.attachments_json)?,
        })
    }
}

struct RawDetails {
    id: String,
    content: String,
    kind: String,
    uri: String,
    indexed_at: i64,
    attachments_json: String,
}

#[async_trait]
impl PostStore for PostCache {
    async fn find_details(&self, id: &str) -> Result<Option<PostDetails>, CacheError> {
        let id = id.to_string();
        self.db
            .run(move |conn| Self::select_details(conn, &id))
            .await
    }

    async fn save_posts(&self, records: Vec<PostRecord>) -> Result<(), CacheError> {
        self.db
            .run(move |conn| Self::write_batch(conn, &records))
            .await
    }

    async fn find_details_many(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, PostDetails>, CacheError> {
        let ids = ids.to_vec();
        self.db
            .run(move |conn| Self::select_details_batch(conn, &ids))
            .await
    }
}
