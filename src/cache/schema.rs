// SPDX-License-Identifier: MPL-2.0

/// SQL schema for the cache database
pub const SCHEMA: &str = r#"
-- Database version for migrations
PRAGMA user_version = 1;

-- post_details: keyed by composite id, author lives in the key
CREATE TABLE IF NOT EXISTS post_details (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    kind TEXT NOT NULL,
    uri TEXT NOT NULL,
    indexed_at INTEGER NOT NULL,
    attachments_json TEXT NOT NULL DEFAULT '[]',
    fetched_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_post_details_indexed_at ON post_details(indexed_at DESC);
CREATE INDEX IF NOT EXISTS idx_post_details_fetched_at ON post_details(fetched_at);

CREATE TABLE IF NOT EXISTS post_counts (
    id TEXT PRIMARY KEY,
    tags INTEGER NOT NULL DEFAULT 0,
    unique_tags INTEGER NOT NULL DEFAULT 0,
    replies INTEGER NOT NULL DEFAULT 0,
    reposts INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS post_relationships (
    id TEXT PRIMARY KEY,
    replied TEXT,
    reposted TEXT,
    mentioned_json TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS post_tags (
    id TEXT PRIMARY KEY,
    tags_json TEXT NOT NULL DEFAULT '[]'
);

-- post_streams: ids the user has already scrolled into view, newest first
CREATE TABLE IF NOT EXISTS post_streams (
    id TEXT PRIMARY KEY,
    stream_json TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- unread_post_streams: ids newer than the read stream's head, not yet merged
CREATE TABLE IF NOT EXISTS unread_post_streams (
    id TEXT PRIMARY KEY,
    stream_json TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;
