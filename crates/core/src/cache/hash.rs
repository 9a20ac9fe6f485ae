//! Request-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the store key for a request.
///
/// Only method and URL take part; headers such as `accept` do not vary the key.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
