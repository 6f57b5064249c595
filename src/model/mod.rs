// SPDX-License-Identifier: MPL-2.0

pub mod ids;
mod stream_id;
mod types;

pub use ids::CompositeId;
pub use stream_id::{StreamId, StreamKind, StreamSorting, StreamSource};
pub use types::{
    FetchPage, PostCounts, PostDetails, PostKind, PostRecord, PostRelationships, PostTag,
    RemoteCounts, RemotePost, RemotePostDetails, RemoteRelationships,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("malformed composite id: {0}")]
    Composite(String),
    #[error("{field} must not contain ':' ({value})")]
    Separator { field: &'static str, value: String },
    #[error("{0} must not be empty")]
    EmptyComponent(&'static str),
    #[error("malformed stream id: {0}")]
    Stream(String),
    #[error("invalid stream tag: {0:?}")]
    Tag(String),
}
