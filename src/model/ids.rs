// SPDX-License-Identifier: MPL-2.0

//! Composite post identifiers.
//!
//! Every post is keyed across caches and streams by `{author}:{post_id}`.
//! Neither component may contain the separator, so a composite id always
//! splits back into exactly the pair it was built from.

use crate::model::IdError;
use std::fmt;
use std::str::FromStr;

/// Separator between the author and the post-local id
pub const SEPARATOR: char = ':';

/// Parsed form of a composite post id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    pub author: String,
    pub post_id: String,
}

impl CompositeId {
    pub fn new(author: &str, post_id: &str) -> Result<Self, IdError> {
        validate_component("author", author)?;
        validate_component("post id", post_id)?;
        Ok(Self {
            author: author.to_string(),
            post_id: post_id.to_string(),
        })
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.author, SEPARATOR, self.post_id)
    }
}

impl FromStr for CompositeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (author, post_id) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| IdError::Composite(s.to_string()))?;
        // A second separator would make the split ambiguous
        if post_id.contains(SEPARATOR) {
            return Err(IdError::Composite(s.to_string()));
        }
        Self::new(author, post_id).map_err(|_| IdError::Composite(s.to_string()))
    }
}

/// Build the composite id string for a post
pub fn build(author: &str, post_id: &str) -> Result<String, IdError> {
    CompositeId::new(author, post_id).map(|id| id.to_string())
}

/// Split a composite id back into `(author, post_id)`
pub fn parse(composite: &str) -> Result<(String, String), IdError> {
    let id: CompositeId = composite.parse()?;
    Ok((id.author, id.post_id))
}

/// Author part of a composite id, if it is well formed.
///
/// Accepts exactly the ids [`parse`] accepts.
pub fn author_of(composite: &str) -> Option<&str> {
    match composite.split_once(SEPARATOR) {
        Some((author, rest))
            if !author.is_empty() && !rest.is_empty() && !rest.contains(SEPARATOR) =>
        {
            Some(author)
        }
        _ => None,
    }
}

fn validate_component(field: &'static str, value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::EmptyComponent(field));
    }
    if value.contains(SEPARATOR) {
        return Err(IdError::Separator {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
