// SPDX-License-Identifier: MPL-2.0

use crate::cache::CacheError;
use crate::cache::schema::SCHEMA;
use crate::config::ORPHAN_POST_MAX_AGE_MS;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle to the cache database for a specific user
#[derive(Clone)]
pub struct CacheDb {
    conn: Arc<Mutex<Connection>>,
}

impl CacheDb {
    /// Open or create cache database for user
    /// Path: ~/.local/share/hangar/{user_id}/cache.db
    pub fn open(user_id: &str) -> Result<Self, CacheError> {
        let path = Self::cache_path(user_id)?;
        Self::open_at(&path)
    }

    /// Open or create a cache database at an explicit path
    pub fn open_at(path: &Path) -> Result<Self, CacheError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Path(format!("failed to create cache dir: {}", e)))?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Throwaway database, used by tests and ephemeral sessions
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        // Run migrations
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run schema migrations
    fn migrate(conn: &Connection) -> Result<(), CacheError> {
        // Execute the schema (all CREATE IF NOT EXISTS)
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get XDG data directory for cache
    fn cache_path(user_id: &str) -> Result<PathBuf, CacheError> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| CacheError::Path("could not find data directory".to_string()))?;

        // Sanitize the id for the filesystem (replace : with _)
        let safe_id = user_id.replace(':', "_");

        Ok(data_dir.join("hangar").join(safe_id).join("cache.db"))
    }

    /// Access connection for operations
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Run a closure against the connection on the blocking pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn run<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.conn()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }

    /// Current unix timestamp in milliseconds
    pub fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Cleanup with sensible defaults: posts no stream references are kept
    /// for 7 days, streams themselves are never expired here
    pub fn cleanup_stale(&self) -> Result<usize, CacheError> {
        self.prune_orphan_posts(ORPHAN_POST_MAX_AGE_MS)
    }

    /// Delete post records older than `max_age_ms` that no read or unread
    /// stream references anymore. Returns the number of posts removed.
    pub fn prune_orphan_posts(&self, max_age_ms: i64) -> Result<usize, CacheError> {
        let mut conn = self.conn()?;
        let cutoff = Self::now() - max_age_ms;
        let tx = conn.transaction()?;

        let orphans: Vec<String> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id FROM post_details
                WHERE fetched_at < ?1
                AND id NOT IN (
                    SELECT value FROM post_streams, json_each(post_streams.stream_json)
                    UNION
                    SELECT value FROM unread_post_streams, json_each(unread_post_streams.stream_json)
                )
                "#,
            )?;
            stmt.query_map([cutoff], |row| row.get(0))?
                .collect::<Result<Vec<String>, rusqlite::Error>>()?
        };

        for id in &orphans {
            for table in ["post_details", "post_counts", "post_relationships", "post_tags"] {
                tx.execute(&format!("DELETE FROM {table} WHERE id = ?1"), [id])?;
            }
        }
        tx.commit()?;

        Ok(orphans.len())
    }
}
