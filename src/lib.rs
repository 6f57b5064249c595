// SPDX-License-Identifier: MPL-2.0

//! Post-stream pagination and local cache synchronization.
//!
//! Turns a server-paginated, mute-filtered feed into a duplicate-free,
//! gap-free sequence of composite post ids for infinite scroll, and keeps
//! the offline cache of read and unread stream partitions consistent.
//!
//! - [`stream::PostStreamQueue`] buffers fetched-but-undelivered posts per
//!   stream and assembles pages.
//! - [`stream::StreamService`] persists pages, merges unread posts and
//!   decides when the remote needs checking.
//! - [`cache`] is the SQLite-backed post detail cache and stream stores.
//!
//! Operations on one stream identifier must not overlap; see
//! [`stream::PostStreamQueue`].

pub mod cache;
pub mod config;
pub mod model;
pub mod state;
pub mod stream;

pub use cache::{CacheDb, CacheError};
pub use model::{CompositeId, StreamId};
pub use state::StreamSettings;
pub use stream::{
    MuteFilter, PostFilter, PostStreamQueue, RemoteStreamSource, StreamError, StreamHead,
    StreamPage, StreamService,
};
