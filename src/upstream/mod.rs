//! Upstream responder module
//!
//! A responder produces the complete response for a request the cache
//! could not (or must not) answer itself. It is invoked exactly once per
//! request and writes through a [`ResponseWriter`].

mod proxy;
mod static_files;

pub use proxy::ProxyResponder;
pub use static_files::StaticResponder;

use crate::config::UpstreamConfig;
use crate::http::{RequestBody, ResponseWriter};
use async_trait::async_trait;
use hyper::{Request, StatusCode};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while producing an upstream response
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("upstream body failed: {0}")]
    Body(#[from] hyper::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid upstream: {0}")]
    InvalidUpstream(String),
}

/// Something that can write a complete response for a request
#[async_trait]
pub trait Responder: Send + Sync {
    /// Write the response for `request` into `writer`
    ///
    /// Returns the status code that was sent. Errors raised after the head
    /// was committed leave a truncated body behind.
    async fn respond(
        &self,
        writer: &mut dyn ResponseWriter,
        request: Request<RequestBody>,
    ) -> Result<StatusCode, ResponderError>;
}

/// Build the responder described by the `upstream` config section
pub fn from_config(config: &UpstreamConfig) -> Result<Arc<dyn Responder>, ResponderError> {
    match config {
        UpstreamConfig::Proxy { url } => Ok(Arc::new(ProxyResponder::new(url)?)),
        UpstreamConfig::Static { root, index_files } => {
            Ok(Arc::new(StaticResponder::new(root, index_files.clone())))
        }
    }
}
