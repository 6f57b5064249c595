// SPDX-License-Identifier: MPL-2.0

use crate::model::IdError;
use std::fmt;
use std::str::FromStr;

/// Order in which the remote indexer returns a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSorting {
    Timeline,
    TotalEngagement,
}

/// Whose posts a stream draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    All,
    Following,
    Followers,
    Friends,
    Bookmarks,
    Me,
    Replies,
}

/// Content kind filter applied by the remote indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    All,
    Short,
    Long,
    Image,
    Video,
    Link,
    File,
}

/// One logical, independently paginated feed.
///
/// Rendered as `{sorting}:{source}:{kind}` with an optional fourth segment
/// holding a comma separated tag list, e.g. `timeline:following:all` or
/// `total_engagement:all:image:rust,linux`.
///
/// The engine keys streams by this rendered string. `StreamId` is how
/// callers build and validate one before passing `id.to_string()` to
/// [`StreamService`](crate::stream::StreamService).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub sorting: StreamSorting,
    pub source: StreamSource,
    pub kind: StreamKind,
    pub tags: Vec<String>,
}

impl StreamId {
    pub fn new(sorting: StreamSorting, source: StreamSource, kind: StreamKind) -> Self {
        Self {
            sorting,
            source,
            kind,
            tags: Vec::new(),
        }
    }

    /// Home timeline of followed accounts
    pub fn home() -> Self {
        Self::new(
            StreamSorting::Timeline,
            StreamSource::Following,
            StreamKind::All,
        )
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Result<Self, IdError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if tag.is_empty() || tag.contains([':', ',']) {
                return Err(IdError::Tag(tag));
            }
            self.tags.push(tag);
        }
        Ok(self)
    }
}

impl StreamSorting {
    fn as_str(self) -> &'static str {
        match self {
            Self::Timeline => "timeline",
            Self::TotalEngagement => "total_engagement",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "timeline" => Some(Self::Timeline),
            "total_engagement" => Some(Self::TotalEngagement),
            _ => None,
        }
    }
}

impl StreamSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Following => "following",
            Self::Followers => "followers",
            Self::Friends => "friends",
            Self::Bookmarks => "bookmarks",
            Self::Me => "me",
            Self::Replies => "replies",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "following" => Some(Self::Following),
            "followers" => Some(Self::Followers),
            "friends" => Some(Self::Friends),
            "bookmarks" => Some(Self::Bookmarks),
            "me" => Some(Self::Me),
            "replies" => Some(Self::Replies),
            _ => None,
        }
    }
}

impl StreamKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Short => "short",
            Self::Long => "long",
            Self::Image => "image",
            Self::Video => "video",
            Self::Link => "link",
            Self::File => "file",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
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

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.sorting.as_str(),
            self.source.as_str(),
            self.kind.as_str()
        )?;
        if !self.tags.is_empty() {
            write!(f, ":{}", self.tags.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for StreamId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdError::Stream(s.to_string());
        let mut parts = s.split(':');

        let sorting = parts.next().and_then(StreamSorting::parse).ok_or_else(invalid)?;
        let source = parts.next().and_then(StreamSource::parse).ok_or_else(invalid)?;
        let kind = parts.next().and_then(StreamKind::parse).ok_or_else(invalid)?;

        let stream = Self::new(sorting, source, kind);
        let stream = match parts.next() {
            Some(tags) => stream
                .with_tags(tags.split(','))
                .map_err(|_| invalid())?,
            None => stream,
        };

        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(stream)
    }
}
