//! Cache orchestration
//!
//! [`CacheHandler`] decides per request whether to replay a stored entry,
//! forward without caching, or fetch while populating the store. All the
//! per-key coordination is left to [`CacheStore::get_or_populate`].

use super::entry::{CacheEntry, CacheStatus};
use super::error::CacheError;
use super::hit::serve_cached;
use super::key::cache_key;
use super::matcher::matcher_for;
use super::miss::{fetch_and_store, MissContext};
use super::policy::{CachePolicy, Eligibility, SafeMethods, StatusPolicy};
use super::splitter::Completion;
use super::store::{CacheStore, MemoryStore, Populate, Producer};
use crate::config::CacheConfig;
use crate::http::{write_plain_response, RequestBody, RequestHead, ResponseWriter};
use crate::logger::{log_debug, log_warning};
use crate::upstream::Responder;
use futures::FutureExt;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Request, StatusCode};
use std::sync::Arc;

/// Outcome of [`CacheHandler::handle`]
#[derive(Debug)]
pub struct Handled {
    /// Status sent to the client, or 500 when no branch produced one
    pub status: StatusCode,
    pub cache_status: CacheStatus,
    pub error: Option<CacheError>,
}

/// Caching front for a [`Responder`]
pub struct CacheHandler {
    config: CacheConfig,
    status_header: Option<HeaderName>,
    store: Arc<dyn CacheStore>,
    policy: Arc<dyn CachePolicy>,
    eligibility: Arc<dyn Eligibility>,
    responder: Arc<dyn Responder>,
}

/// Values the store's producer reports back to `handle`
struct Progress {
    status: StatusCode,
    cache_status: CacheStatus,
    completion: Option<Completion>,
}

impl CacheHandler {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        policy: Arc<dyn CachePolicy>,
        eligibility: Arc<dyn Eligibility>,
        responder: Arc<dyn Responder>,
    ) -> Result<Self, CacheError> {
        let status_header = match config.status_header.trim() {
            "" => None,
            name => Some(
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| CacheError::InvalidStatusHeader(name.to_string()))?,
            ),
        };

        Ok(Self {
            config,
            status_header,
            store,
            policy,
            eligibility,
            responder,
        })
    }

    /// Handler with the in-memory store and the default policies
    pub fn with_defaults(
        config: CacheConfig,
        responder: Arc<dyn Responder>,
    ) -> Result<Self, CacheError> {
        let eligibility = SafeMethods::new(config.enabled);
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(StatusPolicy),
            Arc::new(eligibility),
            responder,
        )
    }

    /// Serve `request` into `writer`
    ///
    /// Resolves once the response has been fully delivered and, on a miss,
    /// once its body has been persisted or discarded.
    pub async fn handle<W>(&self, request: Request<RequestBody>, mut writer: W) -> Handled
    where
        W: ResponseWriter + 'static,
    {
        let head = RequestHead::from_request(&request);

        if !self.eligibility.should_cache(&head) {
            self.mark(&mut writer, CacheStatus::Skip);
            return self.forward(&head, request, writer).await;
        }

        let key = cache_key(&head);
        let matches = matcher_for(&head);
        let mut progress = Progress {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            cache_status: CacheStatus::Miss,
            completion: None,
        };

        let producer: Producer<'_> = {
            let progress = &mut progress;
            let ctx = MissContext {
                key: &key,
                request: &head,
                config: &self.config,
                policy: self.policy.as_ref(),
                store: self.store.as_ref(),
                status_header: self.status_header.as_ref(),
            };
            let responder = Arc::clone(&self.responder);

            Box::new(move |previous: Option<Arc<CacheEntry>>| {
                async move {
                    if let Some(entry) = previous.filter(|e| e.is_public) {
                        progress.cache_status = CacheStatus::Hit;
                        progress.status =
                            serve_cached(&mut writer, &entry, ctx.status_header).await;
                        return Ok::<_, CacheError>(Populate::Keep);
                    }

                    let outcome = fetch_and_store(&ctx, responder, writer, request).await?;
                    progress.status = outcome.entry.response.status;
                    progress.completion = Some(outcome.completion);
                    Ok(Populate::Replace(outcome.entry))
                }
                .boxed()
            })
        };

        let result = self.store.get_or_populate(&key, &matches, producer).await;
        log_debug(&format!("[Cache] {} {key}", progress.cache_status));

        if let Some(completion) = progress.completion.take() {
            completion.wait().await;
        }

        if let Err(e) = &result {
            log_warning(&format!("[Cache] {key}: {e}"));
        }

        Handled {
            status: progress.status,
            cache_status: progress.cache_status,
            error: result.err(),
        }
    }

    /// Pass the request straight to the responder
    async fn forward<W: ResponseWriter>(
        &self,
        head: &RequestHead,
        request: Request<RequestBody>,
        mut writer: W,
    ) -> Handled {
        let (status, error) = match self.responder.respond(&mut writer, request).await {
            Ok(status) => {
                if !writer.is_committed() {
                    writer.write_head(status);
                }
                (status, None)
            }
            Err(e) => {
                if !writer.is_committed() {
                    // Client may already be gone
                    let _ = write_plain_response(&mut writer, StatusCode::BAD_GATEWAY, head.is_head())
                        .await;
                }
                (StatusCode::BAD_GATEWAY, Some(CacheError::from(e)))
            }
        };

        Handled {
            status,
            cache_status: CacheStatus::Skip,
            error,
        }
    }

    fn mark(&self, writer: &mut dyn ResponseWriter, status: CacheStatus) {
        if let Some(name) = &self.status_header {
            writer
                .headers_mut()
                .insert(name.clone(), HeaderValue::from_static(status.as_str()));
        }
    }
}
