//! The `<prefix>.<payload>.<signature>` string envelope.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use handoff_wire::mac;

use crate::TokenValidationError;
use crate::secret::Secret;

/// A token split into its decoded parts, signature not yet checked.
pub(crate) struct RawToken {
    pub(crate) payload: Vec<u8>,
    pub(crate) signature: Vec<u8>,
}

impl RawToken {
    /// Tries every secret; the first match wins.
    pub(crate) fn signed_by_any(&self, secrets: &[Secret]) -> bool {
        secrets
            .iter()
            .any(|secret| mac::verify(secret, &[&self.payload], &self.signature))
    }

    /// Signature as it appears in the token, used where a token has no
    /// nonce of its own.
    pub(crate) fn signature_text(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.signature)
    }
}

pub(crate) fn encode(prefix: &str, payload: &[u8], secret: &[u8]) -> String {
    let signature = mac::sign(secret, &[payload]);
    format!(
        "{prefix}.{}.{}",
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(signature)
    )
}

pub(crate) fn decode(encoded: &str, prefix: &str) -> Result<RawToken, TokenValidationError> {
    let mut parts = encoded.split('.');
    let (Some(head), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenValidationError::malformed("expected three dot-separated parts"));
    };
    if head != prefix {
        return Err(TokenValidationError::malformed("unexpected token prefix"));
    }
    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenValidationError::malformed("payload is not base64url"))?;
    if payload.is_empty() {
        return Err(TokenValidationError::malformed("empty payload"));
    }
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenValidationError::malformed("signature is not base64url"))?;
    Ok(RawToken { payload, signature })
}
