// SPDX-License-Identifier: MPL-2.0

mod error;
mod queue;
mod service;
mod source;
mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::StreamError;
pub use queue::{CollectRequest, CollectResult, PostStreamQueue, QueueEntry};
pub use service::{StreamHead, StreamPage, StreamService};
pub use source::{MuteFilter, PostFilter, RemoteStreamSource};
pub use store::{PostStore, StreamEntry, StreamStore};
