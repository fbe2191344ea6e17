//! Response splitter
//!
//! Runs a responder on its own task and turns its single "write the
//! response" call into three observable events: the committed head, the
//! body chunks and completion. The client still receives every byte; the
//! body channel only sees a copy.

use crate::http::{write_plain_response, RequestBody, ResponseWriter};
use crate::logger::{log_error, log_warning};
use crate::upstream::Responder;
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::{Request, StatusCode};
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Status and headers committed by the responder
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Background tasks that must finish before a request is done
#[derive(Debug, Default)]
pub struct Completion {
    tasks: Vec<JoinHandle<()>>,
}

impl Completion {
    pub fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Wait for every task, in the order they were added
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                log_error(&format!("[Cache] Background task failed: {e}"));
            }
        }
    }
}

/// Events produced by [`split`]
pub struct SplitResponse {
    /// Fires once, before the first body chunk
    pub head: oneshot::Receiver<ResponseHead>,
    /// Body chunks in write order; closes when the responder returns
    pub body: mpsc::Receiver<Bytes>,
    /// Covers the responder task
    pub completion: Completion,
}

/// Start `responder` on a new task, writing through `writer`
///
/// `capacity` bounds how many chunks the body channel buffers before the
/// responder waits for its consumer.
pub fn split<W>(
    responder: Arc<dyn Responder>,
    writer: W,
    request: Request<RequestBody>,
    capacity: usize,
) -> SplitResponse
where
    W: ResponseWriter + 'static,
{
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity.max(1));
    let is_head = request.method() == hyper::Method::HEAD;

    let task = tokio::spawn(async move {
        let mut tee = TeeWriter {
            inner: writer,
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
        };

        match responder.respond(&mut tee, request).await {
            Ok(status) => {
                if !tee.is_committed() {
                    tee.write_head(status);
                }
            }
            Err(e) => {
                log_warning(&format!("[Cache] Upstream responder failed: {e}"));
                if !tee.is_committed() {
                    // Client may already be gone
                    let _ = write_plain_response(&mut tee, StatusCode::BAD_GATEWAY, is_head).await;
                }
            }
        }
        // Dropping the tee closes the body channel
    });

    let mut completion = Completion::default();
    completion.push(task);

    SplitResponse {
        head: head_rx,
        body: body_rx,
        completion,
    }
}

/// Writer that copies the head and every chunk off the real client writer
struct TeeWriter<W> {
    inner: W,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: Option<mpsc::Sender<Bytes>>,
}

#[async_trait]
impl<W: ResponseWriter> ResponseWriter for TeeWriter<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.inner.is_committed() {
            return;
        }
        let headers = self.inner.headers().clone();
        self.inner.write_head(status);
        if let Some(head_tx) = self.head_tx.take() {
            let _ = head_tx.send(ResponseHead { status, headers });
        }
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        if !self.is_committed() {
            self.write_head(StatusCode::OK);
        }

        let sent = self.inner.write(chunk.clone()).await;

        // Keep feeding the store after a client write error; partial bodies are kept
        if let Some(body_tx) = &self.body_tx {
            if body_tx.send(chunk).await.is_err() {
                // Nobody is storing this body anymore
                self.body_tx = None;
            }
        }

        sent
    }
}
