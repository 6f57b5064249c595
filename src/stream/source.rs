// SPDX-License-Identifier: MPL-2.0

//! Remote and filtering collaborators.
//!
//! The transport to the remote indexer is not part of this crate; callers
//! implement [`RemoteStreamSource`] on top of their client. Retry and backoff
//! belong to that implementation, the engine treats any error as final.

use crate::model::{FetchPage, RemotePost, ids};
use crate::stream::StreamError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

#[async_trait]
pub trait RemoteStreamSource: Send + Sync {
    /// Page of ids strictly older than `cursor`, in canonical stream order.
    /// `None` asks for the newest page.
    async fn fetch_page(
        &self,
        stream_id: &str,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<FetchPage, StreamError>;

    /// Ids strictly newer than `head`, newest first
    async fn fetch_newer(
        &self,
        stream_id: &str,
        head: Option<i64>,
        limit: usize,
    ) -> Result<FetchPage, StreamError>;

    /// Full post records for composite ids
    async fn fetch_posts(&self, ids: &[String]) -> Result<Vec<RemotePost>, StreamError>;
}

/// Visibility filter, re-supplied on every call because mute state changes.
///
/// Implementations must be idempotent: filtering the same ids twice under the
/// same state yields the same result.
#[async_trait]
pub trait PostFilter: Send + Sync {
    async fn filter(&self, ids: Vec<String>) -> Result<Vec<String>, StreamError>;
}

#[async_trait]
impl<F> PostFilter for F
where
    F: Fn(Vec<String>) -> Vec<String> + Send + Sync,
{
    async fn filter(&self, ids: Vec<String>) -> Result<Vec<String>, StreamError> {
        Ok(self(ids))
    }
}

/// Drops posts whose author is muted
#[derive(Debug, Default)]
pub struct MuteFilter {
    muted: RwLock<HashSet<String>>,
}

impl MuteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mute(&self, author: &str) {
        self.muted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(author.to_string());
    }

    pub fn unmute(&self, author: &str) {
        self.muted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(author);
    }

    pub fn is_muted(&self, author: &str) -> bool {
        self.muted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(author)
    }

    fn apply(&self, mut ids: Vec<String>) -> Vec<String> {
        let muted = self.muted.read().unwrap_or_else(PoisonError::into_inner);
        if muted.is_empty() {
            return ids;
        }
        // Ids without a parsable author cannot be attributed, keep them
        ids.retain(|id| ids::author_of(id).is_none_or(|author| !muted.contains(author)));
        ids
    }
}

#[async_trait]
impl PostFilter for MuteFilter {
    async fn filter(&self, ids: Vec<String>) -> Result<Vec<String>, StreamError> {
        Ok(self.apply(ids))
    }
}
