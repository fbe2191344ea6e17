//! Cache storage interfaces
//!
//! The core never touches storage directly. It asks a [`CacheStore`] to
//! look up or populate a key, and opens [`ContentSink`]s to persist bodies.

mod memory;

pub use memory::{MemoryContent, MemoryStore};

use super::entry::CacheEntry;
use super::error::CacheError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use hyper::body::Bytes;
use std::fmt;
use std::sync::Arc;

/// Independent reader over a stored body
pub type BodyStream = BoxStream<'static, Result<Bytes, CacheError>>;

/// Predicate used by the store to select a usable entry
pub type EntryMatcher<'a> = dyn Fn(&CacheEntry) -> bool + Send + Sync + 'a;

/// Callback run by the store to produce a replacement for a key
///
/// Receives the previously stored matching entry, if any.
pub type Producer<'a> = Box<
    dyn FnOnce(Option<Arc<CacheEntry>>) -> BoxFuture<'a, Result<Populate, CacheError>> + Send + 'a,
>;

/// Outcome of a [`Producer`]
#[derive(Debug)]
pub enum Populate {
    /// Store this entry in place of the previous one
    Replace(CacheEntry),
    /// Leave the stored value untouched
    Keep,
}

/// Repeatable-read side of a stored body
pub trait StoredContent: Send + Sync + fmt::Debug {
    /// A fresh reader positioned at the first byte
    fn reader(&self) -> BodyStream;
}

/// Write-once side of a stored body
#[async_trait]
pub trait ContentSink: Send {
    /// Readable handle for the body being written
    fn content(&self) -> Arc<dyn StoredContent>;

    async fn write(&mut self, chunk: Bytes) -> Result<(), CacheError>;

    /// Finalize the body. Readers end after the last written chunk.
    async fn close(self: Box<Self>) -> Result<(), CacheError>;
}

/// Entry store with a single-flight lookup primitive
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up `key` and let `producer` decide what to store
    ///
    /// Calls sharing a key are serialized so that at most one producer
    /// builds a replacement for that key at a time.
    async fn get_or_populate<'a>(
        &self,
        key: &str,
        matches: &EntryMatcher<'_>,
        producer: Producer<'a>,
    ) -> Result<(), CacheError>;

    /// Open a destination for a body stored under `key`
    async fn new_content_sink(&self, key: &str) -> Result<Box<dyn ContentSink>, CacheError>;
}
