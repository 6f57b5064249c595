// SPDX-License-Identifier: MPL-2.0

//! Storage contracts consumed by the stream engine.
//!
//! The SQLite implementations live in [`crate::cache`]; the engine only
//! sees these traits so storage failures can be injected in tests.

use crate::cache::CacheError;
use crate::model::{PostDetails, PostRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered post ids persisted for one stream identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: String,
    pub stream: Vec<String>,
}

/// Post Detail Cache
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn find_details(&self, id: &str) -> Result<Option<PostDetails>, CacheError>;

    /// Write every record in one batch
    async fn save_posts(&self, records: Vec<PostRecord>) -> Result<(), CacheError>;

    /// Details for every id that is cached; missing ids are simply absent
    async fn find_details_many(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, PostDetails>, CacheError> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(details) = self.find_details(id).await? {
                found.insert(id.clone(), details);
            }
        }
        Ok(found)
    }
}

/// Durable store for read streams and unread streams
#[async_trait]
pub trait StreamStore: Send + Sync {
    async fn find_by_id(&self, stream_id: &str) -> Result<Option<StreamEntry>, CacheError>;

    /// Replace the stream's full ordered id list
    async fn upsert(&self, stream_id: &str, ids: Vec<String>) -> Result<(), CacheError>;

    async fn delete_by_id(&self, stream_id: &str) -> Result<(), CacheError>;
}
