//! Request handler module
//!
//! Bridges hyper connections onto the cache front: every request gets a
//! [`ClientWriter`](crate::http::ClientWriter) and is handed to the
//! [`CacheHandler`](crate::cache::CacheHandler) on its own task.

pub mod router;

// Re-export main entry point
pub use router::handle_request;
