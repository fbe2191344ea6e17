//! Cache key composition.
//!
//! Keys identify a resource independently of request headers; variants
//! selected by `Vary` are told apart by the entry matcher instead.

use crate::http::RequestHead;
use url::form_urlencoded;

/// Canonical key: `METHOD host/path[?query]`
///
/// The query is re-encoded with pairs sorted by name (values keep their
/// relative order), so equivalent encodings share a key.
pub fn cache_key(request: &RequestHead) -> String {
    let mut key = format!(
        "{} {}{}",
        request.method,
        request.host(),
        request.uri.path()
    );

    let query = request.uri.query().map(canonical_query).unwrap_or_default();
    if !query.is_empty() {
        key.push('?');
        key.push_str(&query);
    }

    key
}

fn canonical_query(raw: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request;
    use hyper::Method;

    fn key_of(method: Method, uri: &str, headers: &[(&str, &str)]) -> String {
        cache_key(&RequestHead::from_request(&request(method, uri, headers)))
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            key_of(Method::GET, "http://example.com/a/b?x=1", &[]),
            "GET example.com/a/b?x=1"
        );
    }

    #[test]
    fn test_host_from_header() {
        assert_eq!(
            key_of(Method::GET, "/index.html", &[("host", "site.test:8080")]),
            "GET site.test:8080/index.html"
        );
    }

    #[test]
    fn test_headers_do_not_change_key() {
        let plain = key_of(Method::GET, "/p?q=1", &[("host", "h")]);
        let noisy = key_of(
            Method::GET,
            "/p?q=1",
            &[
                ("host", "h"),
                ("accept-encoding", "gzip"),
                ("cookie", "session=1"),
            ],
        );
        assert_eq!(plain, noisy);
    }

    #[test]
    fn test_method_is_part_of_key() {
        assert_ne!(
            key_of(Method::GET, "/p", &[("host", "h")]),
            key_of(Method::HEAD, "/p", &[("host", "h")])
        );
    }

    #[test]
    fn test_query_is_canonical() {
        assert_eq!(
            key_of(Method::GET, "/p?b=2&a=1&b=1", &[("host", "h")]),
            "GET h/p?a=1&b=2&b=1"
        );
        assert_eq!(
            key_of(Method::GET, "/p?b=2&a=1", &[("host", "h")]),
            key_of(Method::GET, "/p?a=1&b=2", &[("host", "h")])
        );
    }

    #[test]
    fn test_empty_query_is_dropped() {
        assert_eq!(key_of(Method::GET, "/p?", &[("host", "h")]), "GET h/p");
        assert_eq!(key_of(Method::GET, "/p", &[("host", "h")]), "GET h/p");
    }

    #[test]
    fn test_flag_parameter() {
        assert_eq!(
            key_of(Method::GET, "/p?debug&a=x%20y", &[("host", "h")]),
            "GET h/p?a=x+y&debug="
        );
    }
}
