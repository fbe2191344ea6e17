//! Building entries from upstream responses
//!
//! On a miss the upstream response streams to the client while the head is
//! inspected. Once the policy has spoken the body is either persisted in
//! the background or drained and dropped.

use super::entry::{CacheEntry, CacheStatus, CachedResponse};
use super::error::CacheError;
use super::policy::CachePolicy;
use super::splitter::{split, Completion};
use super::store::{CacheStore, ContentSink};
use crate::config::CacheConfig;
use crate::http::{RequestBody, RequestHead, ResponseWriter};
use crate::logger::{log_debug, log_warning};
use crate::upstream::Responder;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Request;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything the miss path reads besides the request itself
pub struct MissContext<'a> {
    pub key: &'a str,
    pub request: &'a RequestHead,
    pub config: &'a CacheConfig,
    pub policy: &'a dyn CachePolicy,
    pub store: &'a dyn CacheStore,
    pub status_header: Option<&'a HeaderName>,
}

/// Entry ready to hand to the store plus the work still in flight
#[derive(Debug)]
pub struct MissOutcome {
    pub entry: CacheEntry,
    /// Covers the responder task and the body pump or drain
    pub completion: Completion,
}

/// Fetch from `responder` and build the replacement entry
///
/// Returns as soon as the response head is known; the body keeps flowing
/// to the client and, when cacheable, into a content sink.
pub async fn fetch_and_store<W>(
    ctx: &MissContext<'_>,
    responder: Arc<dyn Responder>,
    mut writer: W,
    request: Request<RequestBody>,
) -> Result<MissOutcome, CacheError>
where
    W: ResponseWriter + 'static,
{
    if let Some(name) = ctx.status_header {
        writer.headers_mut().insert(
            name.clone(),
            HeaderValue::from_static(CacheStatus::Miss.as_str()),
        );
    }

    let mut entry = CacheEntry::speculative(ctx.request.headers.clone(), ctx.config.default_window());

    let split = split(responder, writer, request, ctx.config.body_buffer);
    let mut completion = split.completion;
    let head = split.head.await.map_err(|_| CacheError::HeadersUnavailable)?;

    let cacheability = ctx
        .policy
        .evaluate(ctx.request, head.status, &head.headers, ctx.config)?;

    let headers = strip_status_header(head.headers, ctx.status_header);

    if !cacheability.cacheable {
        log_debug(&format!(
            "[Cache] {} not cacheable ({}), discarding body",
            ctx.key, head.status
        ));
        entry.response = CachedResponse {
            headers,
            status: head.status,
            body: None,
        };
        completion.push(tokio::spawn(drain(split.body)));
        return Ok(MissOutcome { entry, completion });
    }

    let sink = ctx.store.new_content_sink(ctx.key).await?;

    entry.is_public = true;
    entry.expiration = cacheability.expires_at;
    entry.response = CachedResponse {
        headers,
        status: head.status,
        body: Some(sink.content()),
    };
    completion.push(tokio::spawn(pump(ctx.key.to_string(), split.body, sink)));

    Ok(MissOutcome { entry, completion })
}

/// Drop the indicator header so replays don't carry a stale value
fn strip_status_header(mut headers: HeaderMap, status_header: Option<&HeaderName>) -> HeaderMap {
    if let Some(name) = status_header {
        headers.remove(name);
    }
    headers
}

async fn drain(mut body: mpsc::Receiver<Bytes>) {
    while body.recv().await.is_some() {}
}

/// Copy the body into `sink` and close it when the body ends
///
/// A failed write stops persisting but the body is still consumed so the
/// responder never waits on a full channel.
async fn pump(key: String, mut body: mpsc::Receiver<Bytes>, mut sink: Box<dyn ContentSink>) {
    let mut failed = false;
    let mut stored = 0usize;

    while let Some(chunk) = body.recv().await {
        if failed {
            continue;
        }
        let len = chunk.len();
        match sink.write(chunk).await {
            Ok(()) => stored += len,
            Err(e) => {
                log_warning(&format!("[Cache] Failed to store body for {key}: {e}"));
                failed = true;
            }
        }
    }

    if let Err(e) = sink.close().await {
        log_warning(&format!("[Cache] Failed to close body for {key}: {e}"));
    }
    log_debug(&format!("[Cache] Stored {stored} bytes for {key}"));
}
