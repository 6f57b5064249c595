// SPDX-License-Identifier: MPL-2.0

//! Stream persistence orchestrator.
//!
//! Coordinates the overflow queue, the read and unread stream stores and the
//! post detail cache. Read streams only ever grow at the tail (older pages)
//! or at the head (merged unread posts and realtime prepends).
//!
//! Streams are addressed by their rendered identifier string, the form a
//! [`StreamId`](crate::model::StreamId) displays as.
//!
//! Like the queue, the service keeps per-stream state without internal
//! locking. Callers serialize operations on one stream identifier; calls on
//! different streams may run concurrently.

use crate::cache::{CacheDb, PostCache, StreamCache, StreamTable};
use crate::config::MAX_FETCH_ITERATIONS;
use crate::model::{
    PostCounts, PostDetails, PostRecord, PostRelationships, RemotePost, ids,
};
use crate::state::StreamSettings;
use crate::stream::{
    CollectRequest, PostFilter, PostStore, PostStreamQueue, RemoteStreamSource, StreamError,
    StreamStore,
};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether a "new posts" check should contact the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHead {
    /// Nothing usable locally, always check the remote
    ForceFetch,
    /// A head id is recorded but its details are missing, do not check
    SkipFetch,
    /// Ordering timestamp of the newest known post
    Timestamp(i64),
}

/// One page handed to the view layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamPage {
    pub post_ids: Vec<String>,
    /// Cursor to pass for the following page
    pub cursor: Option<i64>,
    pub reached_end: bool,
    /// Attachment URIs of newly persisted posts, to hydrate separately
    pub attachments: Vec<String>,
}

pub struct StreamService {
    posts: Arc<dyn PostStore>,
    streams: Arc<dyn StreamStore>,
    unread: Arc<dyn StreamStore>,
    queue: PostStreamQueue,
    settings: StreamSettings,
}

impl StreamService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        streams: Arc<dyn StreamStore>,
        unread: Arc<dyn StreamStore>,
    ) -> Self {
        Self {
            posts,
            streams,
            unread,
            queue: PostStreamQueue::new(),
            settings: StreamSettings::default(),
        }
    }

    /// Service backed by the SQLite cache
    pub fn with_cache(db: &CacheDb) -> Self {
        Self::new(
            Arc::new(PostCache::new(db)),
            Arc::new(StreamCache::new(db, StreamTable::Read)),
            Arc::new(StreamCache::new(db, StreamTable::Unread)),
        )
    }

    pub fn with_settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn queue(&self) -> &PostStreamQueue {
        &self.queue
    }

    /// Replace a stream's full id list
    pub async fn upsert(&self, stream_id: &str, ids: Vec<String>) -> Result<(), StreamError> {
        self.streams.upsert(stream_id, ids).await?;
        Ok(())
    }

    /// Append a fetched page to the read stream, then re-sort the whole
    /// stream newest first by cached timestamp. Ids already present are
    /// skipped, posts without cached details sort last.
    pub async fn persist_new_stream_chunk(
        &self,
        stream_id: &str,
        new_ids: Vec<String>,
    ) -> Result<(), StreamError> {
        let mut stream = self
            .streams
            .find_by_id(stream_id)
            .await?
            .map(|entry| entry.stream)
            .unwrap_or_default();

        let mut present: HashSet<String> = stream.iter().cloned().collect();
        stream.extend(new_ids.into_iter().filter(|id| present.insert(id.clone())));

        if stream.is_empty() {
            self.streams.delete_by_id(stream_id).await?;
            return Ok(());
        }

        let details = self.posts.find_details_many(&stream).await?;
        // Stable: equal and missing timestamps keep their relative order
        stream.sort_by_key(|id| Reverse(details.get(id).map_or(0, |d| d.indexed_at)));

        self.streams.upsert(stream_id, stream).await?;
        Ok(())
    }

    /// Insert a realtime post at the head of an existing stream.
    ///
    /// Unlike the other writers this never creates an entry: a stream that
    /// was never loaded is left alone, so the first page load still sees a
    /// cold stream and fetches the newest page instead of showing one post.
    pub async fn prepend_to_stream(&self, stream_id: &str, id: &str) -> Result<(), StreamError> {
        let Some(entry) = self.streams.find_by_id(stream_id).await? else {
            return Ok(());
        };
        if entry.stream.iter().any(|existing| existing == id) {
            return Ok(());
        }

        let mut stream = Vec::with_capacity(entry.stream.len() + 1);
        stream.push(id.to_string());
        stream.extend(entry.stream);
        self.streams.upsert(stream_id, stream).await?;
        Ok(())
    }

    /// Remove every occurrence of `id` from the read stream
    pub async fn remove_from_stream(&self, stream_id: &str, id: &str) -> Result<(), StreamError> {
        let Some(mut entry) = self.streams.find_by_id(stream_id).await? else {
            return Ok(());
        };

        let before = entry.stream.len();
        entry.stream.retain(|existing| existing != id);
        if entry.stream.len() == before {
            return Ok(());
        }

        if entry.stream.is_empty() {
            self.streams.delete_by_id(stream_id).await?;
        } else {
            self.streams.upsert(stream_id, entry.stream).await?;
        }
        Ok(())
    }

    /// Move unread ids to the head of the read stream and drop the unread
    /// entry. Returns false when either side is missing.
    pub async fn merge_unread_stream_with_post_stream(
        &self,
        stream_id: &str,
    ) -> Result<bool, StreamError> {
        let Some(unread) = self.unread.find_by_id(stream_id).await? else {
            return Ok(false);
        };
        let Some(read) = self.streams.find_by_id(stream_id).await? else {
            return Ok(false);
        };

        let mut seen = HashSet::with_capacity(unread.stream.len() + read.stream.len());
        let merged: Vec<String> = unread
            .stream
            .into_iter()
            .chain(read.stream)
            .filter(|id| seen.insert(id.clone()))
            .collect();

        debug!(stream = stream_id, total = merged.len(), "merged unread posts into stream");

        self.streams.upsert(stream_id, merged).await?;
        self.unread.delete_by_id(stream_id).await?;
        Ok(true)
    }

    /// Prepend newly detected ids to the unread stream
    pub async fn persist_unread_new_stream_chunk(
        &self,
        stream_id: &str,
        new_ids: Vec<String>,
    ) -> Result<(), StreamError> {
        let existing = self
            .unread
            .find_by_id(stream_id)
            .await?
            .map(|entry| entry.stream)
            .unwrap_or_default();

        let mut present: HashSet<String> = existing.iter().cloned().collect();
        let mut stream: Vec<String> = new_ids
            .into_iter()
            .filter(|id| present.insert(id.clone()))
            .collect();

        if stream.is_empty() {
            return Ok(());
        }

        stream.extend(existing);
        self.unread.upsert(stream_id, stream).await?;
        Ok(())
    }

    /// Decide whether a "new posts" check needs the remote.
    ///
    /// | read / unread state                          | result        |
    /// |----------------------------------------------|---------------|
    /// | neither stored                               | `ForceFetch`  |
    /// | unread head resolvable                       | its timestamp |
    /// | read head resolvable                         | its timestamp |
    /// | read head (or lone unread head) unresolvable | `SkipFetch`   |
    /// | read stream empty, no unread head            | `ForceFetch`  |
    pub async fn get_stream_head(&self, stream_id: &str) -> Result<StreamHead, StreamError> {
        let unread = self.unread.find_by_id(stream_id).await?;
        let read = self.streams.find_by_id(stream_id).await?;

        if unread.is_none() && read.is_none() {
            return Ok(StreamHead::ForceFetch);
        }

        let unread_head = unread.as_ref().and_then(|entry| entry.stream.first());
        if let Some(head) = unread_head
            && let Some(details) = self.posts.find_details(head).await?
        {
            return Ok(StreamHead::Timestamp(details.indexed_at));
        }

        match read.as_ref().and_then(|entry| entry.stream.first()) {
            Some(head) => match self.posts.find_details(head).await? {
                Some(details) => Ok(StreamHead::Timestamp(details.indexed_at)),
                None => Ok(StreamHead::SkipFetch),
            },
            None if unread_head.is_some() => Ok(StreamHead::SkipFetch),
            None => Ok(StreamHead::ForceFetch),
        }
    }

    /// Write full records for freshly fetched posts and return every
    /// attachment URI in the batch.
    pub async fn persist_posts(&self, posts: Vec<RemotePost>) -> Result<Vec<String>, StreamError> {
        let mut attachments = Vec::new();
        let mut records = Vec::with_capacity(posts.len());

        for post in posts {
            let remote = post.details;
            let id = ids::build(&remote.author, &remote.id)?;
            attachments.extend(remote.attachments.iter().cloned());

            records.push(PostRecord {
                details: PostDetails {
                    id: id.clone(),
                    content: remote.content,
                    kind: remote.kind,
                    uri: remote.uri,
                    indexed_at: remote.indexed_at,
                    attachments: remote.attachments,
                },
                counts: PostCounts {
                    id: id.clone(),
                    tags: post.counts.tags,
                    unique_tags: post.counts.unique_tags,
                    replies: post.counts.replies,
                    reposts: post.counts.reposts,
                },
                relationships: PostRelationships {
                    id,
                    replied: post.relationships.replied,
                    reposted: post.relationships.reposted,
                    mentioned: post.relationships.mentioned,
                },
                tags: post.tags,
            });
        }

        if !records.is_empty() {
            self.posts.save_posts(records).await?;
        }
        Ok(attachments)
    }

    /// Ids without cached details, in input order
    pub async fn get_not_persisted_posts_in_cache(
        &self,
        ids: &[String],
    ) -> Result<Vec<String>, StreamError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cached = self.posts.find_details_many(ids).await?;
        Ok(ids
            .iter()
            .filter(|id| !cached.contains_key(*id))
            .cloned()
            .collect())
    }

    /// Next page using the configured page size
    pub async fn next_page(
        &self,
        stream_id: &str,
        cursor: Option<i64>,
        source: &dyn RemoteStreamSource,
        filter: &dyn PostFilter,
    ) -> Result<StreamPage, StreamError> {
        self.load_page(stream_id, self.settings.page_size, cursor, source, filter)
            .await
    }

    /// Load the next `limit` posts of a stream, hydrate the ones not cached
    /// yet and persist the page. `cursor == None` (re)initializes the stream
    /// and discards any overflow left by earlier pages.
    ///
    /// On error neither the overflow buffer nor the stream store changes.
    pub async fn load_page(
        &self,
        stream_id: &str,
        limit: usize,
        cursor: Option<i64>,
        source: &dyn RemoteStreamSource,
        filter: &dyn PostFilter,
    ) -> Result<StreamPage, StreamError> {
        let snapshot = self.queue.get(stream_id);
        if cursor.is_none() {
            // Leftovers belong to an older position and would lead the fresh page
            self.queue.remove(stream_id);
        }

        let collected = self
            .queue
            .collect(
                stream_id,
                CollectRequest {
                    limit,
                    cursor,
                    filter,
                    posts: self.posts.as_ref(),
                },
                move |c| source.fetch_page(stream_id, c, limit),
            )
            .await;
        let result = match collected {
            Ok(result) => result,
            Err(e) => {
                self.queue.restore(stream_id, snapshot);
                return Err(e);
            }
        };

        let persisted = async {
            let mut wanted: Vec<String> = result.posts.clone();
            let mut seen: HashSet<&String> = result.posts.iter().collect();
            wanted.extend(
                result
                    .cache_miss_ids
                    .iter()
                    .filter(|id| seen.insert(*id))
                    .cloned(),
            );
            let attachments = self.hydrate(&wanted, source).await?;

            if !result.posts.is_empty() {
                if cursor.is_none() {
                    self.upsert(stream_id, result.posts.clone()).await?;
                } else {
                    self.persist_new_stream_chunk(stream_id, result.posts.clone())
                        .await?;
                }
            }
            Ok::<_, StreamError>(attachments)
        }
        .await;

        let attachments = match persisted {
            Ok(attachments) => attachments,
            Err(e) => {
                self.queue.restore(stream_id, snapshot);
                return Err(e);
            }
        };

        debug!(
            stream = stream_id,
            returned = result.posts.len(),
            reached_end = result.reached_end,
            "loaded stream page"
        );

        Ok(StreamPage {
            cursor: result.timestamp.or(result.cursor),
            post_ids: result.posts,
            reached_end: result.reached_end,
            attachments,
        })
    }

    /// Probe the remote for posts newer than the stream head and park them
    /// in the unread stream. Returns how many new ids were found.
    ///
    /// A full probe only covers the newest posts, so older pages are fetched
    /// until the head is reached. If the head is still out of reach after
    /// [`MAX_FETCH_ITERATIONS`] fetches the stored stream would be left with a
    /// hole; it is dropped instead and the next page load starts cold.
    pub async fn check_for_new_posts(
        &self,
        stream_id: &str,
        source: &dyn RemoteStreamSource,
        filter: &dyn PostFilter,
    ) -> Result<usize, StreamError> {
        let since = match self.get_stream_head(stream_id).await? {
            StreamHead::SkipFetch => {
                debug!(stream = stream_id, "stream head unresolved, skipping new posts check");
                return Ok(0);
            }
            StreamHead::ForceFetch => None,
            StreamHead::Timestamp(ts) => Some(ts),
        };

        let limit = self.settings.unread_probe_limit.max(1);
        let probe = source.fetch_newer(stream_id, since, limit).await?;
        let mut reached_head = since.is_none() || probe.next_page_ids.len() < limit;
        let mut cursor = probe.timestamp;
        let mut raw = probe.next_page_ids;

        if let Some(head) = since {
            let mut iterations = 1;
            while !reached_head && iterations < MAX_FETCH_ITERATIONS {
                let Some(older_than) = cursor else {
                    break;
                };
                iterations += 1;
                let page = source.fetch_page(stream_id, Some(older_than), limit).await?;
                reached_head = page.next_page_ids.len() < limit
                    || page.timestamp.is_some_and(|ts| ts <= head);
                cursor = page.timestamp;
                raw.extend(page.next_page_ids);
            }
        }

        let candidates = if raw.is_empty() {
            Vec::new()
        } else {
            filter.filter(raw).await?
        };

        let mut known: HashSet<String> = HashSet::new();
        for store in [&self.streams, &self.unread] {
            if let Some(entry) = store.find_by_id(stream_id).await? {
                known.extend(entry.stream);
            }
        }
        let mut fresh: Vec<String> = candidates
            .into_iter()
            .filter(|id| known.insert(id.clone()))
            .collect();

        if !reached_head {
            warn!(
                stream = stream_id,
                found = fresh.len(),
                "too many new posts to reach the stream head, dropping stored stream"
            );
            self.clear_stream(stream_id).await?;
            return Ok(fresh.len());
        }

        if fresh.is_empty() {
            return Ok(0);
        }

        self.hydrate(&fresh, source).await?;

        // Older pages may reach past the head; those posts are not new
        if let Some(head) = since {
            let details = self.posts.find_details_many(&fresh).await?;
            fresh.retain(|id| details.get(id).is_none_or(|d| d.indexed_at > head));
            if fresh.is_empty() {
                return Ok(0);
            }
        }

        self.persist_unread_new_stream_chunk(stream_id, fresh.clone())
            .await?;

        debug!(stream = stream_id, count = fresh.len(), "found new posts");
        Ok(fresh.len())
    }

    /// Number of ids waiting in the unread stream
    pub async fn unread_count(&self, stream_id: &str) -> Result<usize, StreamError> {
        Ok(self
            .unread
            .find_by_id(stream_id)
            .await?
            .map_or(0, |entry| entry.stream.len()))
    }

    /// Page through the persisted read stream without touching the remote.
    /// `None` means the stream was never stored.
    pub async fn read_stream(
        &self,
        stream_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Option<Vec<String>>, StreamError> {
        Ok(self
            .streams
            .find_by_id(stream_id)
            .await?
            .map(|entry| entry.stream.into_iter().skip(skip).take(limit).collect()))
    }

    /// Forget everything stored for one stream
    pub async fn clear_stream(&self, stream_id: &str) -> Result<(), StreamError> {
        self.queue.remove(stream_id);
        self.streams.delete_by_id(stream_id).await?;
        self.unread.delete_by_id(stream_id).await?;
        Ok(())
    }

    /// Drop all overflow buffers, e.g. on logout
    pub fn reset(&self) {
        self.queue.clear();
    }

    /// Fetch and persist posts whose details are not cached yet
    async fn hydrate(
        &self,
        ids: &[String],
        source: &dyn RemoteStreamSource,
    ) -> Result<Vec<String>, StreamError> {
        let missing = self.get_not_persisted_posts_in_cache(ids).await?;
        if missing.is_empty() {
            return Ok(Vec::new());
        }
        let posts = source.fetch_posts(&missing).await?;
        self.persist_posts(posts).await
    }
}
