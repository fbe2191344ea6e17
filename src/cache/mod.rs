//! Response cache module
//!
//! Sits between the connection layer and an upstream [`Responder`]. Requests
//! are keyed by method, host, path and query; stored variants are told apart
//! by the `Vary` headers of the response that created them.
//!
//! [`Responder`]: crate::upstream::Responder

mod entry;
mod error;
mod handler;
mod hit;
mod key;
mod matcher;
mod miss;
mod policy;
mod splitter;
pub mod store;

// Re-export public types
pub use entry::{CacheEntry, CacheStatus, CachedResponse};
pub use error::CacheError;
pub use handler::{CacheHandler, Handled};
pub use key::cache_key;
pub use matcher::{matcher_for, vary_matches};
pub use policy::{CachePolicy, Cacheability, Eligibility, SafeMethods, StatusPolicy};
pub use splitter::{split, Completion, ResponseHead, SplitResponse};
pub use store::{CacheStore, ContentSink, MemoryStore, Populate, StoredContent};
