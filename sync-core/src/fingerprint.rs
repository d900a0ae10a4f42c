//! Content fingerprints.
//!
//! A fingerprint is the standard base64 encoding of the SHA-512 digest of
//! an encoded payload. Peers send it with a `get` so the replier can skip
//! answering with a value the requester already holds.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha512};

/// Fingerprint an encoded payload.
pub fn fingerprint(payload: &str) -> String {
    STANDARD.encode(Sha512::digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
    }

    #[test]
    fn fingerprint_differs_on_content() {
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }

    #[test]
    fn fingerprint_is_base64_sha512() {
        // 64 digest bytes → 88 base64 characters with padding
        let fp = fingerprint("");
        assert_eq!(fp.len(), 88);
        assert_eq!(
            fp,
            "z4PhNX7vuL3xVChQ1m2AB9Yg5AULVxXcg/SpIdNs6c5H0NE8XYXysP+DGNKHfuwvY7kxvUdBeoGlODJ6+SfaPg=="
        );
    }
}
