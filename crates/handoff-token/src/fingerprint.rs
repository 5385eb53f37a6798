//! Certificate fingerprints as carried in proxy token claims.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// SHA-256 of a DER certificate, unpadded base64url.
pub fn sha256_base64url(cert_der: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(cert_der))
}

/// Normalizes an operator-supplied fingerprint. Returns `None` unless
/// it decodes to exactly 32 bytes.
pub fn canonicalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')).ok()?;
    (bytes.len() == 32).then(|| URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_base64url_is_43_chars() {
        let fp = sha256_base64url(b"certificate bytes");
        assert_eq!(fp.len(), 43);
        assert!(!fp.contains('='));
    }

    #[test]
    fn test_canonicalize_accepts_padded_and_trims() {
        let fp = sha256_base64url(b"cert");
        assert_eq!(canonicalize(&format!(" {fp}= ")), Some(fp.clone()));
        assert_eq!(canonicalize(&fp), Some(fp));
    }

    #[test]
    fn test_canonicalize_rejects_wrong_length_and_garbage() {
        assert_eq!(canonicalize("abcd"), None);
        assert_eq!(canonicalize("!!!"), None);
        assert_eq!(canonicalize(""), None);
    }
}
