// SPDX-License-Identifier: MPL-2.0

//! In-memory overflow buffer between the remote stream and the caller.
//!
//! Remote pages rarely line up with the page size the caller asks for: the
//! mute filter removes items after the fetch and a fetch can return more than
//! is needed. [`PostStreamQueue::collect`] assembles exactly `limit` unique,
//! filter-passing ids and parks whatever is left over for the next call on
//! the same stream.
//!
//! The queue is not synchronized against concurrent `collect` calls for the
//! same stream identifier. Callers keep at most one pagination request in
//! flight per stream; different streams are independent.

use crate::config::MAX_FETCH_ITERATIONS;
use crate::model::FetchPage;
use crate::stream::{PostFilter, PostStore, StreamError};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Posts fetched but not yet handed to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueEntry {
    pub posts: Vec<String>,
    /// Remote cursor the buffered posts were fetched up to
    pub cursor: Option<i64>,
}

/// Inputs for one [`PostStreamQueue::collect`] call
pub struct CollectRequest<'a> {
    pub limit: usize,
    pub cursor: Option<i64>,
    /// Applied to buffered and freshly fetched ids alike
    pub filter: &'a dyn PostFilter,
    /// Resolves ordering timestamps when the buffer alone satisfies the page
    pub posts: &'a dyn PostStore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectResult {
    /// At most `limit` unique, filter-passing ids
    pub posts: Vec<String>,
    /// Cache misses reported across every fetch, deduplicated
    pub cache_miss_ids: Vec<String>,
    /// Remote cursor after the last fetch, or the request cursor if none ran
    pub cursor: Option<i64>,
    /// Ordering timestamp to continue from, when known
    pub timestamp: Option<i64>,
    /// The remote returned a short page and nothing is left buffered
    pub reached_end: bool,
}

/// Per-stream overflow buffers
#[derive(Debug)]
pub struct PostStreamQueue {
    entries: Mutex<HashMap<String, QueueEntry>>,
    max_iterations: usize,
}

impl Default for PostStreamQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PostStreamQueue {
    pub fn new() -> Self {
        Self::with_max_iterations(MAX_FETCH_ITERATIONS)
    }

    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn get(&self, stream_id: &str) -> Option<QueueEntry> {
        self.entries().get(stream_id).cloned()
    }

    /// Store a buffer; an empty one removes the entry instead
    pub fn save(&self, stream_id: &str, entry: QueueEntry) {
        if entry.posts.is_empty() {
            self.remove(stream_id);
        } else {
            self.entries().insert(stream_id.to_string(), entry);
        }
    }

    /// Drop one stream's buffer, e.g. when navigating away from it
    pub fn remove(&self, stream_id: &str) {
        self.entries().remove(stream_id);
    }

    /// Drop every buffer, e.g. on logout
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Put back a previously taken snapshot
    pub(crate) fn restore(&self, stream_id: &str, snapshot: Option<QueueEntry>) {
        match snapshot {
            Some(entry) => self.save(stream_id, entry),
            None => self.remove(stream_id),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, QueueEntry>> {
        // Entries are plain data, a panic elsewhere cannot leave them half written
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assemble the next page for `stream_id`.
    ///
    /// Buffered ids are re-filtered first. When they already fill the page no
    /// fetch happens and the returned timestamp is the one of the last id
    /// handed out. Otherwise `fetch` is called with the advancing cursor
    /// until the page is full, the remote returns fewer than `limit` ids, or
    /// the iteration cap is hit.
    ///
    /// Fetch and filter errors propagate and leave the buffer untouched.
    pub async fn collect<F, Fut>(
        &self,
        stream_id: &str,
        request: CollectRequest<'_>,
        mut fetch: F,
    ) -> Result<CollectResult, StreamError>
    where
        F: FnMut(Option<i64>) -> Fut,
        Fut: Future<Output = Result<FetchPage, StreamError>>,
    {
        let CollectRequest {
            limit,
            cursor: request_cursor,
            filter,
            posts: post_store,
        } = request;

        if limit == 0 {
            return Ok(CollectResult {
                cursor: request_cursor,
                ..Default::default()
            });
        }

        let buffered = self.get(stream_id).unwrap_or_default();
        let mut posts = if buffered.posts.is_empty() {
            Vec::new()
        } else {
            filter.filter(buffered.posts).await?
        };

        let mut seen = HashSet::with_capacity(posts.len());
        posts.retain(|id| seen.insert(id.clone()));

        if posts.len() >= limit {
            let overflow = posts.split_off(limit);
            let timestamp = Self::timestamp_of(post_store, &posts[limit - 1]).await;
            debug!(
                stream = stream_id,
                returned = posts.len(),
                buffered = overflow.len(),
                "page served from overflow buffer"
            );

            self.save(
                stream_id,
                QueueEntry {
                    posts: overflow,
                    cursor: buffered.cursor,
                },
            );

            return Ok(CollectResult {
                posts,
                cache_miss_ids: Vec::new(),
                cursor: request_cursor,
                timestamp,
                reached_end: false,
            });
        }

        let mut cursor = request_cursor;
        let mut timestamp = None;
        let mut cache_miss_ids = Vec::new();
        let mut seen_misses = HashSet::new();
        let mut end_of_stream = false;
        let mut iterations = 0;

        while posts.len() < limit && iterations < self.max_iterations {
            iterations += 1;

            let page = fetch(cursor).await?;
            let fetched = page.next_page_ids.len();

            let survivors = if page.next_page_ids.is_empty() {
                Vec::new()
            } else {
                filter.filter(page.next_page_ids).await?
            };
            for id in survivors {
                if seen.insert(id.clone()) {
                    posts.push(id);
                }
            }

            for id in page.cache_miss_post_ids {
                if seen_misses.insert(id.clone()) {
                    cache_miss_ids.push(id);
                }
            }

            if let Some(ts) = page.timestamp {
                cursor = Some(ts);
                timestamp = Some(ts);
            }

            if fetched < limit {
                end_of_stream = true;
                break;
            }
        }

        if !end_of_stream && posts.len() < limit {
            warn!(
                stream = stream_id,
                iterations,
                collected = posts.len(),
                limit,
                "fetch iteration cap reached with a short page"
            );
        }

        let overflow = posts.split_off(posts.len().min(limit));
        let reached_end = end_of_stream && overflow.is_empty();
        self.save(
            stream_id,
            QueueEntry {
                posts: overflow,
                cursor,
            },
        );

        Ok(CollectResult {
            posts,
            cache_miss_ids,
            cursor,
            timestamp,
            reached_end,
        })
    }

    /// Ordering timestamp of a post, or `None` if it cannot be read
    async fn timestamp_of(post_store: &dyn PostStore, id: &str) -> Option<i64> {
        match post_store.find_details(id).await {
            Ok(Some(details)) => Some(details.indexed_at),
            Ok(None) => {
                warn!(post = id, "no cached details for last returned post");
                None
            }
            Err(e) => {
                warn!(post = id, error = %e, "failed to read last returned post timestamp");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheDb, PostCache};
    use crate::stream::test_support::{FailingPostStore, ids, no_fetch, page, post_ids, record};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STREAM: &str = "timeline:all:all";

    fn keep_all(ids: Vec<String>) -> Vec<String> {
        ids
    }

    /// Post cache holding `post-0..post-{n}` with the index as timestamp
    fn seeded_cache(n: usize) -> PostCache {
        let cache = PostCache::new(&CacheDb::open_in_memory().unwrap());
        let records: Vec<_> = (0..n)
            .map(|i| record(&format!("post-{i}"), i as i64))
            .collect();
        cache.store_batch(&records).unwrap();
        cache
    }

    #[tokio::test]
    async fn test_overflow_buffer_serves_next_page_without_fetching() {
        let cache = seeded_cache(30);
        let queue = PostStreamQueue::new();
        let calls = AtomicUsize::new(0);

        let first = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 20,
                    cursor: None,
                    filter: &keep_all,
                    posts: &cache,
                },
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, StreamError>(page(post_ids(0..30), Some(29))) }
                },
            )
            .await
            .unwrap();

        assert_eq!(first.posts, post_ids(0..20));
        assert_eq!(queue.get(STREAM).unwrap().posts, post_ids(20..30));
        assert!(!first.reached_end);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 10,
                    cursor: first.timestamp,
                    filter: &keep_all,
                    posts: &cache,
                },
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, StreamError>(FetchPage::default()) }
                },
            )
            .await
            .unwrap();

        assert_eq!(second.posts, post_ids(20..30));
        assert_eq!(second.timestamp, Some(29));
        assert!(!second.reached_end);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(queue.get(STREAM).is_none());
    }

    #[tokio::test]
    async fn test_early_return_timestamp_tracks_last_returned_post() {
        let cache = seeded_cache(30);
        let queue = PostStreamQueue::new();
        queue.save(
            STREAM,
            QueueEntry {
                posts: post_ids(20..30),
                cursor: Some(29),
            },
        );

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 4,
                    cursor: Some(19),
                    filter: &keep_all,
                    posts: &cache,
                },
                no_fetch,
            )
            .await
            .unwrap();

        assert_eq!(result.posts, post_ids(20..24));
        assert_eq!(result.timestamp, Some(23));
        assert_eq!(result.cursor, Some(19));

        let left = queue.get(STREAM).unwrap();
        assert_eq!(left.posts, post_ids(24..30));
        assert_eq!(left.cursor, Some(29));
    }

    #[tokio::test]
    async fn test_early_return_degrades_when_timestamp_lookup_fails() {
        let queue = PostStreamQueue::new();
        queue.save(
            STREAM,
            QueueEntry {
                posts: ids(&["a:1", "a:2"]),
                cursor: Some(5),
            },
        );

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 2,
                    cursor: Some(7),
                    filter: &keep_all,
                    posts: &FailingPostStore,
                },
                |_| async { Ok::<_, StreamError>(FetchPage::default()) },
            )
            .await
            .unwrap();

        assert_eq!(result.posts, ids(&["a:1", "a:2"]));
        assert_eq!(result.timestamp, None);
        assert!(queue.get(STREAM).is_none());
    }

    #[tokio::test]
    async fn test_early_return_with_uncached_post_has_no_timestamp() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        queue.save(
            STREAM,
            QueueEntry {
                posts: ids(&["a:1"]),
                cursor: None,
            },
        );

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 1,
                    cursor: None,
                    filter: &keep_all,
                    posts: &cache,
                },
                |_| async { Ok::<_, StreamError>(FetchPage::default()) },
            )
            .await
            .unwrap();

        assert_eq!(result.posts, ids(&["a:1"]));
        assert_eq!(result.timestamp, None);
    }

    #[tokio::test]
    async fn test_buffered_items_are_refiltered() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        queue.save(
            STREAM,
            QueueEntry {
                posts: ids(&["alice:1", "bob:2", "alice:3"]),
                cursor: Some(3),
            },
        );

        let mute_bob = |ids: Vec<String>| -> Vec<String> {
            ids.into_iter().filter(|id| !id.starts_with("bob:")).collect()
        };

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 1,
                    cursor: Some(1),
                    filter: &mute_bob,
                    posts: &cache,
                },
                |_| async { Ok::<_, StreamError>(FetchPage::default()) },
            )
            .await
            .unwrap();
        assert_eq!(result.posts, ids(&["alice:1"]));
        // The muted post was dropped from the buffer, not kept for later
        assert_eq!(queue.get(STREAM).unwrap().posts, ids(&["alice:3"]));

        let next = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 5,
                    cursor: Some(1),
                    filter: &keep_all,
                    posts: &cache,
                },
                |_| async { Ok::<_, StreamError>(page(ids(&["alice:4"]), Some(4))) },
            )
            .await
            .unwrap();
        assert_eq!(next.posts, ids(&["alice:3", "alice:4"]));
        assert!(!next.posts.contains(&"bob:2".to_string()));
    }

    #[tokio::test]
    async fn test_fetched_duplicates_of_buffered_items_are_skipped() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        queue.save(
            STREAM,
            QueueEntry {
                posts: ids(&["a:3", "a:4"]),
                cursor: Some(4),
            },
        );

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 4,
                    cursor: Some(2),
                    filter: &keep_all,
                    posts: &cache,
                },
                |_| async { Ok::<_, StreamError>(page(ids(&["a:3", "a:4", "a:5", "a:6"]), Some(6))) },
            )
            .await
            .unwrap();

        assert_eq!(result.posts, ids(&["a:3", "a:4", "a:5", "a:6"]));
        assert_eq!(result.cursor, Some(6));
        assert!(queue.get(STREAM).is_none());
    }

    #[tokio::test]
    async fn test_iteration_cap_with_everything_filtered() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        let calls = AtomicUsize::new(0);
        let drop_all = |_: Vec<String>| -> Vec<String> { Vec::new() };

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 10,
                    cursor: None,
                    filter: &drop_all,
                    posts: &cache,
                },
                |cursor| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    let start = n * 10;
                    async move {
                        assert_eq!(cursor, n.checked_sub(1).map(|p| (p * 10 + 9) as i64));
                        Ok::<_, StreamError>(page(post_ids(start..start + 10), Some((start + 9) as i64)))
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), MAX_FETCH_ITERATIONS);
        assert!(result.posts.is_empty());
        assert!(!result.reached_end);
        assert_eq!(result.cursor, Some(49));
        assert!(queue.get(STREAM).is_none());
    }

    #[tokio::test]
    async fn test_short_page_reaches_end() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        let calls = AtomicUsize::new(0);

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 10,
                    cursor: None,
                    filter: &keep_all,
                    posts: &cache,
                },
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, StreamError>(page(post_ids(0..3), Some(2))) }
                },
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.posts, post_ids(0..3));
        assert!(result.reached_end);
        assert_eq!(result.timestamp, Some(2));
    }

    #[tokio::test]
    async fn test_short_page_with_leftover_overflow_is_not_the_end() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        queue.save(
            STREAM,
            QueueEntry {
                posts: post_ids(0..5),
                cursor: Some(4),
            },
        );

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 6,
                    cursor: Some(4),
                    filter: &keep_all,
                    posts: &cache,
                },
                |_| async { Ok::<_, StreamError>(page(post_ids(5..8), Some(7))) },
            )
            .await
            .unwrap();

        assert_eq!(result.posts, post_ids(0..6));
        assert!(!result.reached_end);
        assert_eq!(queue.get(STREAM).unwrap().posts, post_ids(6..8));
    }

    #[tokio::test]
    async fn test_cache_misses_are_deduplicated_across_iterations() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        let calls = AtomicUsize::new(0);
        let only_odd = |ids: Vec<String>| -> Vec<String> {
            ids.into_iter()
                .filter(|id| id.ends_with(['1', '3', '5', '7', '9']))
                .collect()
        };

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 4,
                    cursor: None,
                    filter: &only_odd,
                    posts: &cache,
                },
                |_| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        let start = n * 4;
                        let mut p = page(post_ids(start..start + 4), Some((start + 3) as i64));
                        p.cache_miss_post_ids = ids(&["miss:1", "miss:2"]);
                        Ok::<_, StreamError>(p)
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.posts, ids(&["post-1", "post-3", "post-5", "post-7"]));
        assert_eq!(result.cache_miss_ids, ids(&["miss:1", "miss:2"]));
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_buffer_untouched() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        let entry = QueueEntry {
            posts: ids(&["a:1"]),
            cursor: Some(1),
        };
        queue.save(STREAM, entry.clone());

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 5,
                    cursor: Some(1),
                    filter: &keep_all,
                    posts: &cache,
                },
                |_| async { Err::<FetchPage, _>(StreamError::Fetch("indexer unavailable".to_string())) },
            )
            .await;

        assert!(matches!(result, Err(StreamError::Fetch(_))));
        assert_eq!(queue.get(STREAM), Some(entry));
    }

    #[tokio::test]
    async fn test_zero_limit_is_a_no_op() {
        let cache = seeded_cache(0);
        let queue = PostStreamQueue::new();
        queue.save(
            STREAM,
            QueueEntry {
                posts: ids(&["a:1"]),
                cursor: None,
            },
        );

        let result = queue
            .collect(
                STREAM,
                CollectRequest {
                    limit: 0,
                    cursor: Some(3),
                    filter: &keep_all,
                    posts: &cache,
                },
                no_fetch,
            )
            .await
            .unwrap();

        assert!(result.posts.is_empty());
        assert_eq!(result.cursor, Some(3));
        assert_eq!(queue.get(STREAM).unwrap().posts, ids(&["a:1"]));
    }

    #[test]
    fn test_remove_and_clear() {
        let queue = PostStreamQueue::new();
        let entry = QueueEntry {
            posts: ids(&["a:1"]),
            cursor: None,
        };
        queue.save("timeline:all:all", entry.clone());
        queue.save("timeline:following:all", entry);
        assert_eq!(queue.len(), 2);

        queue.remove("timeline:all:all");
        assert!(queue.get("timeline:all:all").is_none());
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_saving_empty_entry_removes_it() {
        let queue = PostStreamQueue::new();
        queue.save(
            STREAM,
            QueueEntry {
                posts: ids(&["a:1"]),
                cursor: None,
            },
        );
        queue.save(STREAM, QueueEntry::default());
        assert!(queue.get(STREAM).is_none());
    }
}
