// SPDX-License-Identifier: MPL-2.0

use crate::cache::CacheError;
use crate::model::IdError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("invalid id: {0}")]
    Id(#[from] IdError),
    #[error("remote fetch failed: {0}")]
    Fetch(String),
    #[error("post filter failed: {0}")]
    Filter(String),
}
