//! Header hygiene for requests forwarded to network backends.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use tracing::warn;

/// Headers owned by the HTTP client; forwarding them would duplicate or contradict it.
pub const TRANSPORT_MANAGED_HEADERS: [&str; 2] = ["content-length", "host"];

/// Drop `Content-Length` and `Host` in any spelling. Idempotent.
pub fn clean_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| {
            !TRANSPORT_MANAGED_HEADERS
                .iter()
                .any(|banned| k.eq_ignore_ascii_case(banned))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Descriptor headers overlaid with caller headers, both cleaned.
pub fn forwarded_headers(
    configured: &HashMap<String, String>,
    caller: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = clean_headers(configured);
    for (key, value) in clean_headers(caller) {
        merged.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        merged.insert(key, value);
    }
    merged
}

/// Convert to a reqwest header map, skipping entries that are not valid HTTP.
pub fn to_header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(val)) => {
                map.insert(name, val);
            }
            _ => warn!("Skipping invalid header {}", key),
        }
    }
    map
}
