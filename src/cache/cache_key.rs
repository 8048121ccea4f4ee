//! Deterministic cache key derivation.

use crate::types::Request;
use url::Url;

/// Cache key derived from method + normalized URL + a canonical serialization
/// of the headers the caller opted into key derivation.
///
/// Derivation is pure: the same inputs always yield the same key, and headers
/// outside the opted-in set never affect which cached entry is returned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request.
    pub fn derive(request: &Request) -> Self {
        let header_pairs: Vec<(String, String)> = {
            let mut pairs: Vec<(String, String)> = request
                .cache_key_headers()
                .iter()
                .flat_map(|name| {
                    request
                        .headers()
                        .get_all(name.as_str())
                        .iter()
                        .filter_map(move |value| {
                            value
                                .to_str()
                                .ok()
                                .map(|v| (name.clone(), v.to_string()))
                        })
                })
                .collect();
            pairs.sort();
            pairs
        };
        let serialized: Vec<String> = header_pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        Self::from_parts(
            request.method().as_str(),
            &normalize_url(request.url()),
            &serialized,
        )
    }

    /// Assemble a key from already-normalized parts.
    pub fn from_parts(method: &str, normalized_url: &str, headers: &[String]) -> Self {
        let mut key = String::with_capacity(
            method.len() + normalized_url.len() + headers.iter().map(|h| h.len() + 1).sum::<usize>() + 2,
        );
        key.push_str(method);
        key.push(' ');
        key.push_str(normalized_url);
        for header in headers {
            key.push('\n');
            key.push_str(header);
        }
        Self(key)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a URL for key derivation: the parser already lowercases scheme
/// and host and strips default ports; query pairs are stable-sorted so
/// parameter order does not split cache entries.
fn normalize_url(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        return trim_fragment(url);
    }
    pairs.sort();
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    normalized.to_string()
}

fn trim_fragment(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.set_query(None);
    normalized.to_string()
}
