//! HMAC-SHA256 signing and constant-time comparison.
//!
//! Shared by the messaging frame (trailing MAC) and by the token layer
//! (signature part of a token string).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 tag.
pub const MAC_SIZE: usize = 32;

/// Signs the concatenation of `parts` with `secret`.
pub fn sign(secret: &[u8], parts: &[&[u8]]) -> [u8; MAC_SIZE] {
    let mut mac = HmacSha256::new_from_slice(secret)
        .expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    let mut tag = [0u8; MAC_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

/// Returns `true` if `expected` is the tag of `parts` under `secret`.
///
/// An empty tag never verifies.
pub fn verify(secret: &[u8], parts: &[&[u8]], expected: &[u8]) -> bool {
    if expected.is_empty() {
        return false;
    }
    constant_time_eq(&sign(secret, parts), expected)
}

/// Compares two byte strings without an early exit on the first
/// differing byte. Length mismatch is not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_rfc4231_case_2() {
        let tag = sign(b"Jefe", &[b"what do ya want ", b"for nothing?"]);
        let expected = [
            0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95,
            0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9,
            0x64, 0xec, 0x38, 0x43,
        ];
        assert_eq!(tag, expected);
    }

    #[test]
    fn test_verify_wrong_secret_returns_false() {
        let tag = sign(b"one", &[b"payload"]);
        assert!(verify(b"one", &[b"payload"], &tag));
        assert!(!verify(b"two", &[b"payload"], &tag));
    }

    #[test]
    fn test_verify_empty_tag_returns_false() {
        assert!(!verify(b"one", &[b"payload"], &[]));
    }

    #[test]
    fn test_constant_time_eq_length_mismatch_returns_false() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"abc", b"abc"));
    }
}
