//! Vary-aware entry matching

use super::entry::CacheEntry;
use crate::http::RequestHead;
use hyper::header::{HeaderMap, HeaderName, VARY};

/// Predicate deciding whether a stored entry may answer `request`
///
/// Evaluated by the store while it resolves concurrent lookups, so it only
/// reads from both sides.
pub fn matcher_for(request: &RequestHead) -> impl Fn(&CacheEntry) -> bool + Send + Sync + '_ {
    move |entry| vary_matches(entry, &request.headers)
}

/// Compare every header named by the stored response's `Vary`
///
/// Entries without `Vary` match unconditionally.
pub fn vary_matches(entry: &CacheEntry, current: &HeaderMap) -> bool {
    let mut vary = entry.response.headers.get_all(VARY).iter().peekable();
    if vary.peek().is_none() {
        return true;
    }

    vary.filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .all(|name| same_values(&entry.request_headers, current, name))
}

/// Ordered list equality of one header's values
fn same_values(stored: &HeaderMap, current: &HeaderMap, name: &str) -> bool {
    // Not a valid name, so neither side can carry it
    let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
        return true;
    };

    let mut stored = stored.get_all(&name).iter();
    let mut current = current.get_all(&name).iter();
    loop {
        match (stored.next(), current.next()) {
            (None, None) => return true,
            (Some(a), Some(b)) if a == b => {}
            _ => return false,
        }
    }
}
