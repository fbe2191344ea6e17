//! Cache error types.

use crate::upstream::ResponderError;
use thiserror::Error;

/// Errors that abort a cache operation
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cacheability policy could not decide.
    #[error("cache policy failed: {0}")]
    Policy(String),

    /// The store failed to read or write.
    #[error("cache storage failed: {0}")]
    Storage(String),

    /// The responder task ended without producing a response head.
    #[error("upstream ended before sending response headers")]
    HeadersUnavailable,

    /// The configured status header is not a valid header name.
    #[error("invalid status header name '{0}'")]
    InvalidStatusHeader(String),

    /// The responder failed outside of any caching logic.
    #[error(transparent)]
    Upstream(#[from] ResponderError),
}
