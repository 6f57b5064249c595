// SPDX-License-Identifier: MPL-2.0

pub const APP_ID: &str = "io.github.sethcottle.Hangar";

/// Upper bound on remote fetches for a single page. A stream whose pages are
/// entirely muted would otherwise be fetched forever.
pub const MAX_FETCH_ITERATIONS: usize = 5;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// How many ids one "new posts" probe asks for
pub const UNREAD_PROBE_LIMIT: usize = 50;

/// Posts not referenced by any stream are pruned after this age (7 days)
pub const ORPHAN_POST_MAX_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;
