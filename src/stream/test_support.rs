// SPDX-License-Identifier: MPL-2.0

//! Fakes shared by the cache and stream tests.

use crate::cache::CacheError;
use crate::model::{
    FetchPage, PostCounts, PostDetails, PostKind, PostRecord, PostRelationships, RemotePost,
    RemotePostDetails,
};
use crate::stream::{PostStore, RemoteStreamSource, StreamEntry, StreamError, StreamStore};
use async_trait::async_trait;
use std::future::Ready;
use std::ops::Range;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

/// `post-{i}` for every i in range
pub fn post_ids(range: Range<usize>) -> Vec<String> {
    range.map(|i| format!("post-{i}")).collect()
}

pub fn page(next_page_ids: Vec<String>, timestamp: Option<i64>) -> FetchPage {
    FetchPage {
        next_page_ids,
        cache_miss_post_ids: Vec::new(),
        timestamp,
    }
}

pub fn record(id: &str, indexed_at: i64) -> PostRecord {
    PostRecord {
        details: PostDetails {
            id: id.to_string(),
            content: format!("content of {id}"),
            kind: PostKind::Short,
            uri: format!("pubky://{id}"),
            indexed_at,
            attachments: Vec::new(),
        },
        counts: PostCounts {
            id: id.to_string(),
            ..Default::default()
        },
        relationships: PostRelationships {
            id: id.to_string(),
            ..Default::default()
        },
        tags: Vec::new(),
    }
}

pub fn remote_post(author: &str, post_id: &str, indexed_at: i64) -> RemotePost {
    RemotePost {
        details: RemotePostDetails {
            id: post_id.to_string(),
            author: author.to_string(),
            content: format!("post {post_id} by {author}"),
            kind: PostKind::Short,
            uri: format!("pubky://{author}/pub/posts/{post_id}"),
            indexed_at,
            attachments: Vec::new(),
        },
        counts: Default::default(),
        relationships: Default::default(),
        tags: Vec::new(),
    }
}

/// Fetch callback for calls that must be served without the remote
pub fn no_fetch(_: Option<i64>) -> Ready<Result<FetchPage, StreamError>> {
    panic!("unexpected remote fetch")
}

/// Post store whose every call fails
pub struct FailingPostStore;

#[async_trait]
impl PostStore for FailingPostStore {
    async fn find_details(&self, _id: &str) -> Result<Option<PostDetails>, CacheError> {
        Err(CacheError::Poisoned)
    }

    async fn save_posts(&self, _records: Vec<PostRecord>) -> Result<(), CacheError> {
        Err(CacheError::Poisoned)
    }
}

/// Stream store whose every call fails
pub struct FailingStreamStore;

#[async_trait]
impl StreamStore for FailingStreamStore {
    async fn find_by_id(&self, _stream_id: &str) -> Result<Option<StreamEntry>, CacheError> {
        Err(CacheError::Poisoned)
    }

    async fn upsert(&self, _stream_id: &str, _ids: Vec<String>) -> Result<(), CacheError> {
        Err(CacheError::Poisoned)
    }

    async fn delete_by_id(&self, _stream_id: &str) -> Result<(), CacheError> {
        Err(CacheError::Poisoned)
    }
}

/// In-memory remote indexer serving one author's posts newest first.
///
/// Post `i` has composite id `{author}:{i}` and timestamp `i * 10`, so pages
/// paginate by timestamp exactly like the real indexer.
pub struct FakeSource {
    author: String,
    posts: Mutex<Vec<RemotePost>>,
    pub page_calls: AtomicUsize,
    pub newer_calls: AtomicUsize,
    pub post_calls: AtomicUsize,
    pub fail_posts: bool,
}

impl FakeSource {
    pub fn new(author: &str, count: usize) -> Self {
        let source = Self {
            author: author.to_string(),
            posts: Mutex::new(Vec::new()),
            page_calls: AtomicUsize::new(0),
            newer_calls: AtomicUsize::new(0),
            post_calls: AtomicUsize::new(0),
            fail_posts: false,
        };
        for i in 0..count {
            source.publish(i);
        }
        source
    }

    pub fn failing_hydration(mut self) -> Self {
        self.fail_posts = true;
        self
    }

    pub fn id(&self, i: usize) -> String {
        format!("{}:{}", self.author, i)
    }

    /// Newest-first ids for an index range given oldest-last
    pub fn ids_desc(&self, range: Range<usize>) -> Vec<String> {
        range.rev().map(|i| self.id(i)).collect()
    }

    /// Make post `i` available on the remote
    pub fn publish(&self, i: usize) {
        let post = remote_post(&self.author, &i.to_string(), (i * 10) as i64);
        let mut posts = self.posts.lock().unwrap();
        posts.push(post);
        posts.sort_by_key(|p| std::cmp::Reverse(p.details.indexed_at));
    }

    fn composite(post: &RemotePost) -> String {
        format!("{}:{}", post.details.author, post.details.id)
    }
}

#[async_trait]
impl RemoteStreamSource for FakeSource {
    async fn fetch_page(
        &self,
        _stream_id: &str,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<FetchPage, StreamError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let posts = self.posts.lock().unwrap();
        let slice: Vec<&RemotePost> = posts
            .iter()
            .filter(|p| cursor.is_none_or(|c| p.details.indexed_at < c))
            .take(limit)
            .collect();

        Ok(FetchPage {
            next_page_ids: slice.iter().map(|p| Self::composite(p)).collect(),
            cache_miss_post_ids: Vec::new(),
            timestamp: slice.last().map(|p| p.details.indexed_at),
        })
    }

    async fn fetch_newer(
        &self,
        _stream_id: &str,
        head: Option<i64>,
        limit: usize,
    ) -> Result<FetchPage, StreamError> {
        self.newer_calls.fetch_add(1, Ordering::SeqCst);
        let posts = self.posts.lock().unwrap();
        let slice: Vec<&RemotePost> = posts
            .iter()
            .filter(|p| head.is_none_or(|h| p.details.indexed_at > h))
            .take(limit)
            .collect();

        Ok(FetchPage {
            next_page_ids: slice.iter().map(|p| Self::composite(p)).collect(),
            cache_miss_post_ids: Vec::new(),
            timestamp: slice.last().map(|p| p.details.indexed_at),
        })
    }

    async fn fetch_posts(&self, ids: &[String]) -> Result<Vec<RemotePost>, StreamError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_posts {
            return Err(StreamError::Fetch("post hydration unavailable".to_string()));
        }
        let posts = self.posts.lock().unwrap();
        Ok(posts
            .iter()
            .filter(|p| ids.contains(&Self::composite(p)))
            .cloned()
            .collect())
    }
}
