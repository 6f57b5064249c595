// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

/// Kind of post content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    #[default]
    Short,
    Long,
    Image,
    Video,
    Link,
    File,
}

impl PostKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
            Self::Image => "image",
            Self::Video => "video",
            Self::Link => "link",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short" => Some(Self::Short),
            "long" => Some(Self::Long),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "link" => Some(Self::Link),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// Locally cached post details, keyed by composite id.
///
/// The author lives in the composite id and is not duplicated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetails {
    /// Composite id `{author}:{post_id}`
    pub id: String,
    pub content: String,
    pub kind: PostKind,
    pub uri: String,
    /// Ordering timestamp in milliseconds, shared by every stream
    pub indexed_at: i64,
    /// Attachment (file) URIs
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostCounts {
    pub id: String,
    pub tags: u32,
    pub unique_tags: u32,
    pub replies: u32,
    pub reposts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRelationships {
    pub id: String,
    /// URI of the post this one replies to
    pub replied: Option<String>,
    /// URI of the post this one reposts
    pub reposted: Option<String>,
    #[serde(default)]
    pub mentioned: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostTag {
    pub label: String,
    pub taggers: Vec<String>,
    pub taggers_count: u32,
    /// Whether the viewer is one of the taggers
    pub relationship: bool,
}

/// Every record persisted for a single post
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub details: PostDetails,
    pub counts: PostCounts,
    pub relationships: PostRelationships,
    pub tags: Vec<PostTag>,
}

/// Post details as returned by the remote indexer (author included)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePostDetails {
    /// Post-local id, without the author
    pub id: String,
    pub author: String,
    pub content: String,
    pub kind: PostKind,
    pub uri: String,
    pub indexed_at: i64,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// A fully hydrated post from the remote indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePost {
    pub details: RemotePostDetails,
    #[serde(default)]
    pub counts: RemoteCounts,
    #[serde(default)]
    pub relationships: RemoteRelationships,
    #[serde(default)]
    pub tags: Vec<PostTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteCounts {
    pub tags: u32,
    pub unique_tags: u32,
    pub replies: u32,
    pub reposts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRelationships {
    pub replied: Option<String>,
    pub reposted: Option<String>,
    #[serde(default)]
    pub mentioned: Vec<String>,
}

/// One page of a remote stream, as ids only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPage {
    /// Composite ids in the stream's canonical order
    pub next_page_ids: Vec<String>,
    /// Ids the indexer knows the client has not cached yet
    pub cache_miss_post_ids: Vec<String>,
    /// Ordering timestamp of the oldest item in the page, the next cursor
    pub timestamp: Option<i64>,
}
