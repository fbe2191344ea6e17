//! Cache entry types

use super::store::StoredContent;
use chrono::{DateTime, Duration, Utc};
use hyper::header::HeaderMap;
use hyper::StatusCode;
use std::fmt;
use std::sync::Arc;

/// Value of the status indicator header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Skip,
}

impl CacheStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored response: head plus an optional replayable body
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub headers: HeaderMap,
    pub status: StatusCode,
    pub body: Option<Arc<dyn StoredContent>>,
}

/// Unit stored in and retrieved from a [`CacheStore`](super::CacheStore)
///
/// Entries are replaced, never edited, once handed to the store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Private entries are never replayed, only replaced
    pub is_public: bool,
    pub expiration: DateTime<Utc>,
    /// Headers of the request that produced this entry, kept for Vary
    pub request_headers: HeaderMap,
    pub response: CachedResponse,
}

impl CacheEntry {
    /// Private placeholder created when a miss starts
    ///
    /// `window` is the speculative lifetime used until the policy resolves
    /// the real expiration.
    pub fn speculative(request_headers: HeaderMap, window: Duration) -> Self {
        Self {
            is_public: false,
            expiration: Utc::now() + window,
            request_headers,
            response: CachedResponse {
                headers: HeaderMap::new(),
                status: StatusCode::OK,
                body: None,
            },
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}
