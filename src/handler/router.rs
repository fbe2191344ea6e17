//! Request dispatch module
//!
//! Entry point for HTTP request processing. The cache handler runs on a
//! separate task so the response head can go out while the body is still
//! being produced.

use crate::config::AppState;
use crate::http::{ClientWriter, ResponseBody};
use crate::logger::{self, AccessLogEntry};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{REFERER, USER_AGENT};
use hyper::{Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Main entry point for HTTP request handling
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    let access_log = state.cached_access_log.load(Ordering::Relaxed);
    let mut entry = access_log.then(|| access_entry(&req, peer_addr));

    let request = req.map(BodyExt::boxed);
    let (writer, pending) = ClientWriter::channel(state.config.cache.body_buffer);
    let bytes_sent = writer.bytes_sent();

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let handled = task_state.handler.handle(request, writer).await;

        if let Some(entry) = entry.as_mut() {
            entry.status = handled.status.as_u16();
            entry.body_bytes =
                usize::try_from(bytes_sent.load(Ordering::Relaxed)).unwrap_or(usize::MAX);
            entry.request_time_us =
                u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
            entry.cache_status = Some(handled.cache_status.to_string());
            logger::log_access(entry, &task_state.config.logging.access_log_format);
        }
    });

    Ok(pending.response().await)
}

/// Request-side fields of the access log line
fn access_entry(req: &Request<Incoming>, peer_addr: SocketAddr) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = http_version(req.version()).to_string();
    entry.referer = header_text(req, REFERER);
    entry.user_agent = header_text(req, USER_AGENT);
    entry
}

fn header_text(req: &Request<Incoming>, name: hyper::header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
