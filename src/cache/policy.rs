//! Cacheability decisions
//!
//! Two questions are asked of every request: whether the cache should be
//! consulted at all ([`Eligibility`]), and once the upstream head is known,
//! whether the response may be stored and for how long ([`CachePolicy`]).

use super::error::CacheError;
use crate::config::CacheConfig;
use crate::http::RequestHead;
use chrono::{DateTime, Utc};
use hyper::header::{HeaderMap, UPGRADE};
use hyper::{Method, StatusCode};

/// Result of a [`CachePolicy`] evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cacheability {
    pub cacheable: bool,
    pub expires_at: DateTime<Utc>,
}

/// Decides whether an upstream response may be stored
pub trait CachePolicy: Send + Sync {
    fn evaluate(
        &self,
        request: &RequestHead,
        status: StatusCode,
        headers: &HeaderMap,
        config: &CacheConfig,
    ) -> Result<Cacheability, CacheError>;
}

/// Decides whether a request goes through the cache at all
pub trait Eligibility: Send + Sync {
    fn should_cache(&self, request: &RequestHead) -> bool;
}

/// Stores responses whose status is listed in `cache.cacheable_statuses`
///
/// Response headers are not inspected.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusPolicy;

impl CachePolicy for StatusPolicy {
    fn evaluate(
        &self,
        _request: &RequestHead,
        status: StatusCode,
        _headers: &HeaderMap,
        config: &CacheConfig,
    ) -> Result<Cacheability, CacheError> {
        let cacheable = config.cacheable_statuses.contains(&status.as_u16());
        let expires_at = Utc::now()
            .checked_add_signed(config.ttl_window())
            .ok_or_else(|| CacheError::Policy(format!("ttl of {}s overflows", config.ttl)))?;

        Ok(Cacheability {
            cacheable,
            expires_at,
        })
    }
}

/// Caches `GET` and `HEAD` requests that are not protocol upgrades
#[derive(Debug, Clone, Copy)]
pub struct SafeMethods {
    enabled: bool,
}

impl SafeMethods {
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Eligibility for SafeMethods {
    fn should_cache(&self, request: &RequestHead) -> bool {
        self.enabled
            && (request.method == Method::GET || request.method == Method::HEAD)
            && !request.headers.contains_key(UPGRADE)
    }
}
