//! Backend-side proxy token validation.
//!
//! Each step is terminal and has its own classification:
//!
//! ```text
//! 1 shape          → MALFORMED
//! 2 signature      → INVALID_SIGNATURE   (any verification secret)
//!   claims parse   → MALFORMED           (only reachable with a valid signature)
//! 3 version        → UNSUPPORTED_VERSION
//! 4 certificates   → MALFORMED
//! 5 issued_at      → NOT_YET_VALID
//! 6 expires_at     → EXPIRED
//! 7 target server  → TARGET_MISMATCH
//! ```
//!
//! Replay (step 8) needs shared state and lives in
//! [`HandshakeInterceptor`](crate::HandshakeInterceptor).

use std::sync::Arc;

use handoff_guard::Clock;
use handoff_wire::TokenRejectReason;
use uuid::Uuid;

use crate::{CURRENT_TOKEN_VERSION, ProxyToken, SecretSource, TokenValidationError};

/// Identifies one use of one token on one backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplayKey {
    pub backend_id: String,
    pub player_id: Uuid,
    /// The token nonce, or the signature text for nonce-less tokens.
    pub nonce: String,
}

/// A token that passed steps 1–7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedToken {
    pub token: ProxyToken,
    pub replay_key: ReplayKey,
}

pub struct ProxyTokenValidator {
    server_id: String,
    secrets: Arc<dyn SecretSource>,
    clock: Arc<dyn Clock>,
    require_certificates: bool,
}

impl ProxyTokenValidator {
    /// Validates tokens addressed to `server_id`. Certificate claims are
    /// required by default.
    pub fn new(server_id: impl Into<String>, secrets: Arc<dyn SecretSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            server_id: server_id.into(),
            secrets,
            clock,
            require_certificates: true,
        }
    }

    pub fn require_certificates(mut self, required: bool) -> Self {
        self.require_certificates = required;
        self
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn validate(&self, encoded: &str) -> Result<ValidatedToken, TokenValidationError> {
        let raw = ProxyToken::decode_raw(encoded)?;
        if !raw.signed_by_any(&self.secrets.verification_secrets()) {
            return Err(TokenValidationError::new(
                TokenRejectReason::InvalidSignature,
                "no accepted secret matches the signature",
            ));
        }
        let token = ProxyToken::from_payload(&raw.payload)?;

        if token.version() != CURRENT_TOKEN_VERSION {
            return Err(TokenValidationError::new(
                TokenRejectReason::UnsupportedVersion,
                format!("token version {}", token.version()),
            ));
        }
        if self.require_certificates
            && (token.client_cert_fingerprint().is_none() || token.proxy_cert_fingerprint().is_none())
        {
            return Err(TokenValidationError::malformed("certificate claims missing"));
        }

        let now = self.clock.now_millis();
        if token.issued_at_millis() > now {
            return Err(TokenValidationError::new(
                TokenRejectReason::NotYetValid,
                format!("issued at {} after now {now}", token.issued_at_millis()),
            ));
        }
        if token.expires_at_millis() < now {
            return Err(TokenValidationError::new(
                TokenRejectReason::Expired,
                format!("expired at {}", token.expires_at_millis()),
            ));
        }
        if token.target_server_id() != self.server_id {
            return Err(TokenValidationError::new(
                TokenRejectReason::TargetMismatch,
                format!("issued for {}", token.target_server_id()),
            ));
        }

        let replay_key = ReplayKey {
            backend_id: self.server_id.clone(),
            player_id: token.player_id(),
            nonce: token
                .nonce()
                .map(str::to_string)
                .unwrap_or_else(|| raw.signature_text()),
        };
        Ok(ValidatedToken { token, replay_key })
    }
}
