//! In-process cache store
//!
//! Each key holds a list of variants (one per distinct `Vary` selection)
//! behind its own `RwLock`. Public hits only take the read lock long enough
//! to pick an entry; everything that may build a new entry runs under the
//! write lock, which is what serializes producers per key.

use super::{
    BodyStream, CacheStore, ContentSink, EntryMatcher, Populate, Producer, StoredContent,
};
use crate::cache::entry::CacheEntry;
use crate::cache::error::CacheError;
use crate::logger::log_debug;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use hyper::body::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};

type Variants = Arc<RwLock<Vec<Arc<CacheEntry>>>>;

#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Variants>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &str) -> Variants {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    /// Drop the slot for `key` once it is empty and no other caller holds it
    async fn release(&self, key: &str, slot: Variants) {
        let mut slots = self.slots.lock().await;
        // Clones are only handed out under `slots`, so the count is stable here
        let unshared = Arc::strong_count(&slot) == 2
            && slots.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot));
        if unshared && slot.try_read().is_ok_and(|variants| variants.is_empty()) {
            slots.remove(key);
        }
    }

    async fn populate(
        slot: &Variants,
        matches: &EntryMatcher<'_>,
        producer: Producer<'_>,
    ) -> Result<(), CacheError> {
        let hit = {
            let now = Utc::now();
            let variants = slot.read().await;
            variants
                .iter()
                .find(|e| fresh_match(e, now, matches))
                .filter(|e| e.is_public)
                .cloned()
        };
        if let Some(entry) = hit {
            return Self::serve_existing(slot, entry, producer).await;
        }

        let mut variants = slot.write().await;
        let now = Utc::now();
        variants.retain(|e| !e.is_expired(now));

        // Another producer may have filled the key while we waited
        let previous = variants.iter().find(|e| matches(e)).cloned();
        if let Some(entry) = previous.as_ref().filter(|e| e.is_public) {
            let entry = Arc::clone(entry);
            drop(variants);
            return Self::serve_existing(slot, entry, producer).await;
        }

        if let Populate::Replace(entry) = producer(previous.clone()).await? {
            replace(&mut variants, previous.as_ref(), entry);
        }
        Ok(())
    }

    /// Run the producer against a public entry without holding the key lock
    async fn serve_existing(
        slot: &Variants,
        previous: Arc<CacheEntry>,
        producer: Producer<'_>,
    ) -> Result<(), CacheError> {
        if let Populate::Replace(entry) = producer(Some(Arc::clone(&previous))).await? {
            let mut variants = slot.write().await;
            replace(&mut variants, Some(&previous), entry);
        }
        Ok(())
    }

    /// Variants currently stored under `key`
    #[cfg(test)]
    pub async fn entries(&self, key: &str) -> Vec<Arc<CacheEntry>> {
        let slot = self.slots.lock().await.get(key).cloned();
        match slot {
            Some(slot) => slot.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// Number of keys currently holding a slot
    #[cfg(test)]
    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

fn fresh_match(entry: &CacheEntry, now: DateTime<Utc>, matches: &EntryMatcher<'_>) -> bool {
    !entry.is_expired(now) && matches(entry)
}

fn replace(variants: &mut Vec<Arc<CacheEntry>>, previous: Option<&Arc<CacheEntry>>, entry: CacheEntry) {
    if let Some(previous) = previous {
        variants.retain(|e| !Arc::ptr_eq(e, previous));
    }
    variants.push(Arc::new(entry));
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_or_populate<'a>(
        &self,
        key: &str,
        matches: &EntryMatcher<'_>,
        producer: Producer<'a>,
    ) -> Result<(), CacheError> {
        let slot = self.slot(key).await;
        let result = Self::populate(&slot, matches, producer).await;
        self.release(key, slot).await;
        result
    }

    async fn new_content_sink(&self, key: &str) -> Result<Box<dyn ContentSink>, CacheError> {
        Ok(Box::new(MemorySink::new(key)))
    }
}

#[derive(Debug, Default)]
struct Blob {
    chunks: Vec<Bytes>,
    closed: bool,
}

/// Body held in memory
///
/// Readers follow the body while it is still being written and end once
/// the sink is closed (or dropped).
#[derive(Debug)]
pub struct MemoryContent {
    state: watch::Receiver<Blob>,
}

impl MemoryContent {
    /// Already closed content holding `body`
    pub fn from_bytes(body: Bytes) -> Self {
        let chunks = if body.is_empty() { Vec::new() } else { vec![body] };
        let (_, state) = watch::channel(Blob {
            chunks,
            closed: true,
        });
        Self { state }
    }
}

enum Next {
    Chunk(Bytes),
    End,
    Wait,
}

impl StoredContent for MemoryContent {
    fn reader(&self) -> BodyStream {
        stream::unfold((self.state.clone(), 0usize), |(mut state, index)| async move {
            loop {
                let next = {
                    let blob = state.borrow_and_update();
                    match blob.chunks.get(index) {
                        Some(chunk) => Next::Chunk(chunk.clone()),
                        None if blob.closed => Next::End,
                        None => Next::Wait,
                    }
                };
                match next {
                    Next::Chunk(chunk) => return Some((Ok(chunk), (state, index + 1))),
                    Next::End => return None,
                    Next::Wait => {
                        // Sink dropped without close: keep what was written
                        if state.changed().await.is_err() {
                            return None;
                        }
                    }
                }
            }
        })
        .boxed()
    }
}

pub struct MemorySink {
    state: watch::Sender<Blob>,
    content: Arc<MemoryContent>,
}

impl MemorySink {
    fn new(key: &str) -> Self {
        let (state, receiver) = watch::channel(Blob::default());
        log_debug(&format!("[Cache] Opened body sink for {key}"));
        Self {
            state,
            content: Arc::new(MemoryContent { state: receiver }),
        }
    }
}

#[async_trait]
impl ContentSink for MemorySink {
    fn content(&self) -> Arc<dyn StoredContent> {
        Arc::clone(&self.content) as Arc<dyn StoredContent>
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), CacheError> {
        self.state.send_modify(|blob| blob.chunks.push(chunk));
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), CacheError> {
        self.state.send_modify(|blob| blob.closed = true);
        Ok(())
    }
}
