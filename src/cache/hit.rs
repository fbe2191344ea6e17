//! Replaying stored responses

use super::entry::{CacheEntry, CacheStatus};
use crate::http::ResponseWriter;
use crate::logger::log_warning;
use futures::StreamExt;
use hyper::header::{HeaderName, HeaderValue};
use hyper::StatusCode;

/// Write `entry` to the client and return the replayed status
///
/// Copying stops early when the client goes away.
pub async fn serve_cached(
    writer: &mut dyn ResponseWriter,
    entry: &CacheEntry,
    status_header: Option<&HeaderName>,
) -> StatusCode {
    let headers = writer.headers_mut();
    if let Some(name) = status_header {
        headers.insert(name.clone(), HeaderValue::from_static(CacheStatus::Hit.as_str()));
    }
    for (name, value) in &entry.response.headers {
        headers.append(name.clone(), value.clone());
    }

    let status = entry.response.status;
    writer.write_head(status);

    let Some(body) = &entry.response.body else {
        return status;
    };

    let mut reader = body.reader();
    while let Some(chunk) = reader.next().await {
        match chunk {
            Ok(chunk) => {
                if writer.write(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                log_warning(&format!("[Cache] Failed to read stored body: {e}"));
                break;
            }
        }
    }

    status
}
