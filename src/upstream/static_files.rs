//! Static file responder
//!
//! Serves files below a root directory with index file support. Files are
//! streamed to the writer in fixed-size chunks.

use super::{Responder, ResponderError};
use crate::http::{mime, write_plain_response, RequestBody, ResponseWriter};
use crate::logger;
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Size of each body chunk written to the client
const CHUNK_SIZE: usize = 16 * 1024;

pub struct StaticResponder {
    root: PathBuf,
    index_files: Vec<String>,
}

impl StaticResponder {
    pub fn new(root: impl AsRef<Path>, index_files: Vec<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index_files,
        }
    }

    /// Resolve a request path to a file inside the root directory
    ///
    /// Directories resolve to their first existing index file. Paths that
    /// escape the root after canonicalization are rejected.
    async fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let root = match fs::canonicalize(&self.root).await {
            Ok(p) => p,
            Err(e) => {
                logger::log_warning(&format!(
                    "Static root not found or inaccessible '{}': {e}",
                    self.root.display()
                ));
                return None;
            }
        };

        let relative = request_path.trim_start_matches('/');
        let mut candidate = root.join(relative);

        if is_dir(&candidate).await {
            for index_file in &self.index_files {
                let index_path = candidate.join(index_file);
                if is_file(&index_path).await {
                    candidate = index_path;
                    break;
                }
            }
        }

        // Missing files are a plain 404, not worth a log line
        let canonical = fs::canonicalize(&candidate).await.ok()?;
        if !canonical.starts_with(&root) {
            logger::log_warning(&format!(
                "Path traversal attempt blocked: {request_path} -> {}",
                canonical.display()
            ));
            return None;
        }

        if is_file(&canonical).await {
            Some(canonical)
        } else {
            None
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

#[async_trait]
impl Responder for StaticResponder {
    async fn respond(
        &self,
        writer: &mut dyn ResponseWriter,
        request: Request<RequestBody>,
    ) -> Result<StatusCode, ResponderError> {
        let method = request.method();
        let is_head = *method == Method::HEAD;

        if !matches!(*method, Method::GET | Method::HEAD) {
            writer
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            write_plain_response(writer, StatusCode::METHOD_NOT_ALLOWED, is_head).await?;
            return Ok(StatusCode::METHOD_NOT_ALLOWED);
        }

        let Some(path) = self.resolve(request.uri().path()).await else {
            write_plain_response(writer, StatusCode::NOT_FOUND, is_head).await?;
            return Ok(StatusCode::NOT_FOUND);
        };

        let content = match fs::read(&path).await {
            Ok(c) => Bytes::from(c),
            Err(e) => {
                logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
                write_plain_response(writer, StatusCode::INTERNAL_SERVER_ERROR, is_head).await?;
                return Err(e.into());
            }
        };

        let headers = writer.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(mime::content_type_for(&path)),
        );
        headers.insert(CONTENT_LENGTH, content.len().into());
        writer.write_head(StatusCode::OK);

        if !is_head {
            let mut offset = 0;
            while offset < content.len() {
                let end = usize::min(offset + CHUNK_SIZE, content.len());
                writer.write(content.slice(offset..end)).await?;
                offset = end;
            }
        }

        Ok(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{request, RecordingWriter};

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/guide.txt"), "read me").unwrap();
        dir
    }

    fn responder(dir: &tempfile::TempDir) -> StaticResponder {
        StaticResponder::new(dir.path(), vec!["index.html".to_string()])
    }

    #[tokio::test]
    async fn test_serves_file() {
        let dir = site();
        let mut writer = RecordingWriter::new();
        let status = responder(&dir)
            .respond(&mut writer, request(Method::GET, "/docs/guide.txt", &[]))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(writer.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(writer.headers()[CONTENT_LENGTH], "7");
        assert_eq!(writer.body(), b"read me");
    }

    #[tokio::test]
    async fn test_directory_uses_index_file() {
        let dir = site();
        let mut writer = RecordingWriter::new();
        responder(&dir)
            .respond(&mut writer, request(Method::GET, "/", &[]))
            .await
            .unwrap();

        assert_eq!(writer.body(), b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_large_file_is_chunked() {
        let dir = site();
        let payload = vec![b'z'; CHUNK_SIZE * 2 + 10];
        std::fs::write(dir.path().join("big.bin"), &payload).unwrap();

        let mut writer = RecordingWriter::new();
        responder(&dir)
            .respond(&mut writer, request(Method::GET, "/big.bin", &[]))
            .await
            .unwrap();

        assert_eq!(writer.chunks().len(), 3);
        assert_eq!(writer.body(), payload);
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let dir = site();
        let mut writer = RecordingWriter::new();
        responder(&dir)
            .respond(&mut writer, request(Method::HEAD, "/docs/guide.txt", &[]))
            .await
            .unwrap();

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(writer.headers()[CONTENT_LENGTH], "7");
        assert!(writer.body().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = site();
        let mut writer = RecordingWriter::new();
        let status = responder(&dir)
            .respond(&mut writer, request(Method::GET, "/nope.txt", &[]))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(writer.body(), b"404 Not Found");
    }

    #[tokio::test]
    async fn test_traversal_is_blocked() {
        let dir = site();
        let mut writer = RecordingWriter::new();
        let status = responder(&dir)
            .respond(&mut writer, request(Method::GET, "/../../etc/passwd", &[]))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_not_allowed() {
        let dir = site();
        let mut writer = RecordingWriter::new();
        let status = responder(&dir)
            .respond(&mut writer, request(Method::POST, "/", &[]))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(writer.headers()[ALLOW], "GET, HEAD");
    }
}
