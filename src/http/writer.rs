//! Client response writer
//!
//! Bridges the push-style [`ResponseWriter`] onto hyper's pull-style
//! response: the committed head travels through a oneshot to the service
//! future, body chunks through a bounded channel wrapped in a `StreamBody`.

use super::response::build_error_response;
use super::ResponseWriter;
use async_trait::async_trait;
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::HeaderMap;
use hyper::{Response, StatusCode};
use std::convert::Infallible;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Body type of every response sent to clients
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// Writer for the response of one client request
pub struct ClientWriter {
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Response<ResponseBody>>>,
    body_tx: mpsc::Sender<Bytes>,
    body_rx: Option<mpsc::Receiver<Bytes>>,
    bytes_sent: Arc<AtomicU64>,
}

/// Service-side half of a [`ClientWriter`]
pub struct PendingResponse {
    head_rx: oneshot::Receiver<Response<ResponseBody>>,
}

impl ClientWriter {
    /// Create a writer and the pending response it will resolve
    ///
    /// `capacity` bounds the number of body chunks buffered between the
    /// writer and the connection.
    pub fn channel(capacity: usize) -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(capacity.max(1));
        let writer = Self {
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx,
            body_rx: Some(body_rx),
            bytes_sent: Arc::new(AtomicU64::new(0)),
        };
        (writer, PendingResponse { head_rx })
    }

    /// Shared counter of body bytes handed to the connection
    pub fn bytes_sent(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_sent)
    }
}

#[async_trait]
impl ResponseWriter for ClientWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn is_committed(&self) -> bool {
        self.head_tx.is_none()
    }

    fn write_head(&mut self, status: StatusCode) {
        let (Some(head_tx), Some(body_rx)) = (self.head_tx.take(), self.body_rx.take()) else {
            return;
        };

        let chunks = stream::unfold(body_rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, Infallible>(Frame::data(chunk)), rx))
        });
        let mut response = Response::new(StreamBody::new(chunks).boxed_unsync());
        *response.status_mut() = status;
        *response.headers_mut() = self.headers.clone();

        // The service future is gone when the client disconnected early;
        // later writes then fail on the body channel.
        let _ = head_tx.send(response);
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        if !self.is_committed() {
            self.write_head(StatusCode::OK);
        }
        let len = u64::try_from(chunk.len()).unwrap_or(u64::MAX);
        self.body_tx
            .send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client connection closed"))?;
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }
}

impl PendingResponse {
    /// Wait for the head to be committed
    ///
    /// Resolves to `502 Bad Gateway` when the writer is dropped without ever
    /// committing a head.
    pub async fn response(self) -> Response<ResponseBody> {
        self.head_rx
            .await
            .unwrap_or_else(|_| build_error_response(StatusCode::BAD_GATEWAY))
    }
}
