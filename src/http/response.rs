//! HTTP response building module
//!
//! Plain-text responses used when a request cannot be served normally.

use super::{ResponseBody, ResponseWriter};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::io;

/// Text body for an error status, e.g. `502 Bad Gateway`
fn status_text(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    )
}

/// Build a complete plain-text response for `status`
pub fn build_error_response(status: StatusCode) -> Response<ResponseBody> {
    let text = status_text(status);
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .header(CONTENT_LENGTH, text.len())
        .body(Full::new(Bytes::from(text)).boxed_unsync())
        .unwrap_or_else(|e| {
            log_build_error(status, &e);
            Response::new(Full::new(Bytes::new()).boxed_unsync())
        })
}

/// Write a plain-text response through a [`ResponseWriter`]
///
/// The body is skipped for `HEAD` requests but `Content-Length` still
/// describes it.
pub async fn write_plain_response(
    writer: &mut dyn ResponseWriter,
    status: StatusCode,
    is_head: bool,
) -> io::Result<()> {
    let text = status_text(status);
    let headers = writer.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONTENT_LENGTH, text.len().into());
    writer.write_head(status);
    if is_head {
        return Ok(());
    }
    writer.write(Bytes::from(text)).await
}

/// Log response build error
fn log_build_error(status: StatusCode, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
