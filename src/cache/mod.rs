// SPDX-License-Identifier: MPL-2.0

mod db;
mod posts;
mod schema;
mod streams;

pub use db::CacheDb;
pub use posts::PostCache;
pub use streams::{StreamCache, StreamTable};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found")]
    NotFound,
    #[error("database path error: {0}")]
    Path(String),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("cache task failed: {0}")]
    Task(String),
}
