//! Reverse proxy responder
//!
//! Forwards requests to a single HTTP origin and streams the answer back
//! frame by frame.

use super::{Responder, ResponderError};
use crate::http::{write_plain_response, RequestBody, ResponseWriter};
use crate::logger;
use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::header::{
    HeaderMap, HeaderName, CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE,
};
use hyper::http::uri::{PathAndQuery, Scheme};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

/// Connection-scoped headers that must not be forwarded
static HOP_BY_HOP: [HeaderName; 7] = [
    CONNECTION,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

pub struct ProxyResponder {
    client: Client<HttpConnector, RequestBody>,
    base: Uri,
}

impl ProxyResponder {
    /// Create a proxy for an `http://host[:port][/prefix]` origin
    pub fn new(url: &str) -> Result<Self, ResponderError> {
        let base: Uri = url
            .parse()
            .map_err(|e| ResponderError::InvalidUpstream(format!("'{url}': {e}")))?;
        if base.scheme() != Some(&Scheme::HTTP) || base.authority().is_none() {
            return Err(ResponderError::InvalidUpstream(format!(
                "'{url}': expected http://host[:port]"
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self { client, base })
    }

    /// Map a client request URI onto the origin
    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, ResponderError> {
        let prefix = self.base.path().trim_end_matches('/');
        let path_and_query = uri.path_and_query().map_or("/", PathAndQuery::as_str);

        let mut builder = Uri::builder()
            .scheme(Scheme::HTTP)
            .path_and_query(format!("{prefix}{path_and_query}"));
        if let Some(authority) = self.base.authority() {
            builder = builder.authority(authority.clone());
        }
        builder
            .build()
            .map_err(|e| ResponderError::InvalidUpstream(e.to_string()))
    }
}

/// Remove hop-by-hop headers, including those named by `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

#[async_trait]
impl Responder for ProxyResponder {
    async fn respond(
        &self,
        writer: &mut dyn ResponseWriter,
        request: Request<RequestBody>,
    ) -> Result<StatusCode, ResponderError> {
        let (mut parts, body) = request.into_parts();
        let is_head = parts.method == Method::HEAD;
        parts.uri = self.upstream_uri(&parts.uri)?;
        strip_hop_by_hop(&mut parts.headers);

        let response = match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => response,
            Err(e) => {
                logger::log_error(&format!("Upstream {} unreachable: {e}", self.base));
                write_plain_response(writer, StatusCode::BAD_GATEWAY, is_head).await?;
                return Err(e.into());
            }
        };

        let (mut parts, mut body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        for (name, value) in &parts.headers {
            writer.headers_mut().append(name.clone(), value.clone());
        }
        writer.write_head(parts.status);

        while let Some(frame) = body.frame().await {
            if let Ok(data) = frame?.into_data() {
                writer.write(data).await?;
            }
        }

        Ok(parts.status)
    }
}
