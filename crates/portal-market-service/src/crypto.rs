//! Cryptographic helpers for webhook authentication.
//!
//! Both providers sign (or share a secret for) their webhook deliveries;
//! these helpers are the shared primitives the per-provider verification
//! builds on.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over `message` and return the lowercase hex digest.
///
/// # Panics
///
/// Never panics in practice: HMAC-SHA256 accepts keys of any length per
/// RFC 2104, so `new_from_slice` cannot fail on a conforming
/// implementation.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

/// Compare two strings without an early exit, so signature checks do not
/// leak match length through timing.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_64_hex_chars() {
        let digest = hmac_sha256_hex("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(
            hmac_sha256_hex("secret", "message"),
            hmac_sha256_hex("secret", "message")
        );
    }

    #[test]
    fn digest_differs_by_secret_and_message() {
        assert_ne!(hmac_sha256_hex("a", "message"), hmac_sha256_hex("b", "message"));
        assert_ne!(hmac_sha256_hex("secret", "a"), hmac_sha256_hex("secret", "b"));
    }

    #[test]
    fn constant_time_eq_agrees_with_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }
}
