//! HTTP protocol layer module
//!
//! Provides the request snapshot and response writer abstractions shared by
//! the cache core, the upstream responders and the hyper connection layer.

pub mod mime;
pub mod response;
pub mod writer;

use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HOST};
use hyper::{Method, Request, StatusCode, Uri, Version};
use std::io;

// Re-export commonly used types
pub use response::{build_error_response, write_plain_response};
pub use writer::{ClientWriter, PendingResponse, ResponseBody};

/// Request body type handed to responders
pub type RequestBody = BoxBody<Bytes, hyper::Error>;

/// Snapshot of a request head, detached from its body
///
/// Taken once per request so that key building, Vary matching and the
/// cacheability policy can all look at the request while the responder
/// owns the body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
        }
    }

    /// Request host: URI authority first, then the `Host` header
    pub fn host(&self) -> &str {
        self.uri
            .authority()
            .map(hyper::http::uri::Authority::as_str)
            .or_else(|| self.headers.get(HOST).and_then(|v| v.to_str().ok()))
            .unwrap_or("")
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }
}

/// Destination a responder writes a complete response into
///
/// Mirrors the classic "response writer" shape: headers are mutable until
/// the head is committed, the first `write_head` fixes the status, and body
/// chunks follow. Writing a chunk before committing commits `200 OK`.
#[async_trait]
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Whether the status line and headers have been committed
    fn is_committed(&self) -> bool;

    /// Commit status and headers. Calls after the first one are ignored.
    fn write_head(&mut self, status: StatusCode);

    /// Append a body chunk
    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;
}
