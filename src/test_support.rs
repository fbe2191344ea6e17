//! Helpers shared by unit tests

use crate::cache::store::{BodyStream, EntryMatcher, MemoryContent, Producer};
use crate::cache::{
    CacheEntry, CacheError, CachePolicy, CacheStore, Cacheability, CachedResponse, ContentSink,
    StoredContent,
};
use crate::config::CacheConfig;
use crate::http::{RequestBody, RequestHead, ResponseWriter};
use crate::upstream::{Responder, ResponderError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, StatusCode};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Bodyless request with the given headers
pub fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> Request<RequestBody> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Empty::<Bytes>::new().map_err(|never| match never {}).boxed())
        .unwrap()
}

pub fn header_map(headers: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    map
}

/// Private, bodyless entry with the given request and response headers
pub fn entry_with(request_headers: &[(&str, &str)], response_headers: &[(&str, &str)]) -> CacheEntry {
    CacheEntry {
        is_public: false,
        expiration: Utc::now() + Duration::hours(1),
        request_headers: header_map(request_headers),
        response: CachedResponse {
            headers: header_map(response_headers),
            status: StatusCode::OK,
            body: None,
        },
    }
}

/// Public `200 OK` entry whose body is already complete
pub fn public_entry(body: &[u8]) -> CacheEntry {
    let mut entry = entry_with(&[], &[]);
    entry.is_public = true;
    entry.response.body = Some(Arc::new(MemoryContent::from_bytes(Bytes::copy_from_slice(body))));
    entry
}

pub async fn read_all(mut stream: BodyStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

/// What a [`RecordingWriter`] committed and wrote
#[derive(Debug, Default)]
pub struct Recorded {
    pub status: Option<StatusCode>,
    /// Headers as they were at commit time
    pub headers: HeaderMap,
    pub chunks: Vec<Bytes>,
}

impl Recorded {
    pub fn body(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

/// In-memory [`ResponseWriter`]
///
/// The record is shared so tests can inspect it after handing the writer
/// off to another task.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    headers: HeaderMap,
    recorded: Arc<Mutex<Recorded>>,
    failing: bool,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer whose body writes fail as if the client disconnected
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Arc<Mutex<Recorded>> {
        Arc::clone(&self.recorded)
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.recorded.lock().unwrap().status
    }

    pub fn body(&self) -> Vec<u8> {
        self.recorded.lock().unwrap().body()
    }

    pub fn chunks(&self) -> Vec<Bytes> {
        self.recorded.lock().unwrap().chunks.clone()
    }
}

#[async_trait]
impl ResponseWriter for RecordingWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn is_committed(&self) -> bool {
        self.recorded.lock().unwrap().status.is_some()
    }

    fn write_head(&mut self, status: StatusCode) {
        let mut recorded = self.recorded.lock().unwrap();
        if recorded.status.is_none() {
            recorded.status = Some(status);
            recorded.headers = self.headers.clone();
        }
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        if self.failing {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
        }
        self.write_head(StatusCode::OK);
        self.recorded.lock().unwrap().chunks.push(chunk);
        Ok(())
    }
}

/// Responder that replays a fixed response and counts its invocations
#[derive(Debug)]
pub struct ScriptedResponder {
    status: StatusCode,
    headers: Vec<(String, String)>,
    chunks: Vec<Bytes>,
    fail_after: Option<usize>,
    delay: Option<std::time::Duration>,
    commit: bool,
    calls: AtomicUsize,
}

impl ScriptedResponder {
    pub fn new(status: StatusCode, chunks: &[&str]) -> Self {
        Self {
            status,
            headers: Vec::new(),
            chunks: chunks
                .iter()
                .map(|c| Bytes::copy_from_slice(c.as_bytes()))
                .collect(),
            fail_after: None,
            delay: None,
            commit: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Fail once `chunks` body chunks have been written (0 fails before the head)
    pub const fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    /// Wait before producing anything
    pub const fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return the status without committing a head
    pub const fn uncommitted(mut self) -> Self {
        self.commit = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn scripted_failure() -> ResponderError {
    ResponderError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "scripted failure"))
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(
        &self,
        writer: &mut dyn ResponseWriter,
        _request: Request<RequestBody>,
    ) -> Result<StatusCode, ResponderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_after == Some(0) {
            return Err(scripted_failure());
        }

        for (name, value) in &self.headers {
            writer.headers_mut().append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        if self.commit {
            writer.write_head(self.status);
        }

        for (written, chunk) in self.chunks.iter().enumerate() {
            if self.fail_after == Some(written) {
                return Err(scripted_failure());
            }
            writer.write(chunk.clone()).await?;
        }

        Ok(self.status)
    }
}

/// Policy returning a fixed decision
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy {
    cacheable: bool,
    expires_at: DateTime<Utc>,
}

impl FixedPolicy {
    pub const fn new(cacheable: bool, expires_at: DateTime<Utc>) -> Self {
        Self {
            cacheable,
            expires_at,
        }
    }
}

impl CachePolicy for FixedPolicy {
    fn evaluate(
        &self,
        _request: &RequestHead,
        _status: StatusCode,
        _headers: &HeaderMap,
        _config: &CacheConfig,
    ) -> Result<Cacheability, CacheError> {
        Ok(Cacheability {
            cacheable: self.cacheable,
            expires_at: self.expires_at,
        })
    }
}

/// Policy that always errors
#[derive(Debug, Clone, Copy)]
pub struct FailingPolicy;

impl CachePolicy for FailingPolicy {
    fn evaluate(
        &self,
        _request: &RequestHead,
        _status: StatusCode,
        _headers: &HeaderMap,
        _config: &CacheConfig,
    ) -> Result<Cacheability, CacheError> {
        Err(CacheError::Policy("scripted failure".to_string()))
    }
}

/// Sink that rejects every write
#[derive(Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl ContentSink for FailingSink {
    fn content(&self) -> Arc<dyn StoredContent> {
        Arc::new(MemoryContent::from_bytes(Bytes::new()))
    }

    async fn write(&mut self, _chunk: Bytes) -> Result<(), CacheError> {
        Err(CacheError::Storage("disk full".to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Sink that accepts every write and flags its close after a delay
#[derive(Debug)]
pub struct SlowCloseSink {
    closed: Arc<AtomicBool>,
    delay: std::time::Duration,
}

impl SlowCloseSink {
    pub const fn new(closed: Arc<AtomicBool>, delay: std::time::Duration) -> Self {
        Self { closed, delay }
    }
}

#[async_trait]
impl ContentSink for SlowCloseSink {
    fn content(&self) -> Arc<dyn StoredContent> {
        Arc::new(MemoryContent::from_bytes(Bytes::new()))
    }

    async fn write(&mut self, _chunk: Bytes) -> Result<(), CacheError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type SinkFactory = Box<dyn Fn() -> Box<dyn ContentSink> + Send + Sync>;

/// Store wrapper counting producer runs and opened sinks
pub struct CountingStore<S> {
    inner: S,
    producers: Arc<AtomicUsize>,
    sinks: AtomicUsize,
    sink_factory: Option<SinkFactory>,
    fail_open: bool,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            producers: Arc::new(AtomicUsize::new(0)),
            sinks: AtomicUsize::new(0),
            sink_factory: None,
            fail_open: false,
        }
    }

    /// Make every `new_content_sink` call fail
    pub const fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Hand out sinks from `factory` instead of the wrapped store
    pub fn with_sink(mut self, factory: impl Fn() -> Box<dyn ContentSink> + Send + Sync + 'static) -> Self {
        self.sink_factory = Some(Box::new(factory));
        self
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }

    pub fn producer_calls(&self) -> usize {
        self.producers.load(Ordering::SeqCst)
    }

    pub fn sinks_opened(&self) -> usize {
        self.sinks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: CacheStore> CacheStore for CountingStore<S> {
    async fn get_or_populate<'a>(
        &self,
        key: &str,
        matches: &EntryMatcher<'_>,
        producer: Producer<'a>,
    ) -> Result<(), CacheError> {
        let producers = Arc::clone(&self.producers);
        let counted: Producer<'a> = Box::new(move |previous| {
            producers.fetch_add(1, Ordering::SeqCst);
            producer(previous)
        });
        self.inner.get_or_populate(key, matches, counted).await
    }

    async fn new_content_sink(&self, key: &str) -> Result<Box<dyn ContentSink>, CacheError> {
        self.sinks.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(CacheError::Storage(format!("no space left for {key}")));
        }
        match &self.sink_factory {
            Some(factory) => Ok(factory()),
            None => self.inner.new_content_sink(key).await,
        }
    }
}
