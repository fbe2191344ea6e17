//! Response caching server
//!
//! Requests pass through a [`cache::CacheHandler`] that serves stored
//! responses when a matching variant exists and otherwise fetches from the
//! configured upstream, streaming to the client while persisting the body.

pub mod cache;
pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
pub mod upstream;

#[cfg(test)]
pub(crate) mod test_support;
