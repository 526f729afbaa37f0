//! Request-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the stored key for a request identity (method + URL).
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_request_key("GET", "https://example.com/logo.png");
        let hash2 = compute_request_key("GET", "https://example.com/logo.png");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_request_key("GET", "https://example.com/logo.png");
        let head = compute_request_key("HEAD", "https://example.com/logo.png");
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_no_boundary_collision() {
        let hash1 = compute_request_key("GET", "Xhttps://example.com");
        let hash2 = compute_request_key("GETX", "https://example.com");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_request_key("GET", "https://example.com/");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
