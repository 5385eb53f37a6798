//! Transfer tokens: short-lived permission to move to one backend.

use std::sync::Arc;

use handoff_guard::Clock;
use handoff_wire::TokenRejectReason;
use uuid::Uuid;

use crate::encoding;
use crate::{CURRENT_TOKEN_VERSION, SecretSource, TokenError, TokenValidationError, claims};

pub const TRANSFER_TOKEN_PREFIX: &str = "t1";
pub const DEFAULT_TRANSFER_TTL_MILLIS: i64 = 30_000;

const FIELD_COUNT: usize = 5;

/// Claims: `version|player_id|target_server_id|issued_at|expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferToken {
    version: u32,
    player_id: Uuid,
    target_server_id: String,
    issued_at_millis: i64,
    expires_at_millis: i64,
}

impl TransferToken {
    pub fn new(
        version: u32,
        player_id: Uuid,
        target_server_id: impl Into<String>,
        issued_at_millis: i64,
        expires_at_millis: i64,
    ) -> Result<Self, TokenError> {
        let target_server_id = target_server_id.into();
        claims::check_id("target_server_id", &target_server_id)?;
        claims::check_times(issued_at_millis, expires_at_millis)?;
        Ok(Self {
            version,
            player_id,
            target_server_id,
            issued_at_millis,
            expires_at_millis,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    pub fn target_server_id(&self) -> &str {
        &self.target_server_id
    }

    pub fn issued_at_millis(&self) -> i64 {
        self.issued_at_millis
    }

    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at_millis
    }

    pub fn encode(&self, secret: &[u8]) -> String {
        let version = self.version.to_string();
        let player = self.player_id.to_string();
        let issued = self.issued_at_millis.to_string();
        let expires = self.expires_at_millis.to_string();
        let payload = claims::join(&[&version, &player, &self.target_server_id, &issued, &expires]);
        encoding::encode(TRANSFER_TOKEN_PREFIX, &payload, secret)
    }

    fn from_payload(payload: &[u8]) -> Result<Self, TokenValidationError> {
        let malformed = || TokenValidationError::malformed("unparseable transfer token claims");
        let parts = claims::split(payload, FIELD_COUNT).ok_or_else(malformed)?;
        Self::new(
            parts[0].parse().map_err(|_| malformed())?,
            Uuid::parse_str(parts[1]).map_err(|_| malformed())?,
            parts[2],
            parts[3].parse().map_err(|_| malformed())?,
            parts[4].parse().map_err(|_| malformed())?,
        )
        .map_err(|e| TokenValidationError::malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// TransferTokenIssuer
// ---------------------------------------------------------------------------

/// Signs transfer tokens with the current secret.
pub struct TransferTokenIssuer {
    secrets: Arc<dyn SecretSource>,
    clock: Arc<dyn Clock>,
    ttl_millis: i64,
}

impl TransferTokenIssuer {
    pub fn new(secrets: Arc<dyn SecretSource>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(secrets, clock, DEFAULT_TRANSFER_TTL_MILLIS)
    }

    pub fn with_ttl(secrets: Arc<dyn SecretSource>, clock: Arc<dyn Clock>, ttl_millis: i64) -> Self {
        Self {
            secrets,
            clock,
            ttl_millis: ttl_millis.max(1),
        }
    }

    pub fn issue(&self, player_id: Uuid, target_server_id: &str) -> Result<String, TokenError> {
        let now = self.clock.now_millis();
        let token = TransferToken::new(
            CURRENT_TOKEN_VERSION,
            player_id,
            target_server_id,
            now,
            now.saturating_add(self.ttl_millis),
        )?;
        Ok(token.encode(&self.secrets.signing_secret()))
    }

    /// The token as handoff payload bytes, ready to ride in referral data.
    pub fn issue_referral_data(&self, player_id: Uuid, target_server_id: &str) -> Result<Vec<u8>, TokenError> {
        self.issue(player_id, target_server_id).map(String::into_bytes)
    }
}

// ---------------------------------------------------------------------------
// TransferTokenValidator
// ---------------------------------------------------------------------------

/// Checks a transfer token presented back to the proxy.
pub struct TransferTokenValidator {
    secrets: Arc<dyn SecretSource>,
    clock: Arc<dyn Clock>,
}

impl TransferTokenValidator {
    pub fn new(secrets: Arc<dyn SecretSource>, clock: Arc<dyn Clock>) -> Self {
        Self { secrets, clock }
    }

    /// Order: shape, signature, claims, version, player, not-yet-valid, expiry.
    pub fn validate(&self, encoded: &str, expected_player: Uuid) -> Result<TransferToken, TokenValidationError> {
        let raw = encoding::decode(encoded, TRANSFER_TOKEN_PREFIX)?;
        if !raw.signed_by_any(&self.secrets.verification_secrets()) {
            return Err(TokenValidationError::new(
                TokenRejectReason::InvalidSignature,
                "transfer token signature mismatch",
            ));
        }
        let token = TransferToken::from_payload(&raw.payload)?;
        if token.version != CURRENT_TOKEN_VERSION {
            return Err(TokenValidationError::new(
                TokenRejectReason::UnsupportedVersion,
                format!("transfer token version {}", token.version),
            ));
        }
        if token.player_id != expected_player {
            return Err(TokenValidationError::new(
                TokenRejectReason::TargetMismatch,
                "transfer token issued for another player",
            ));
        }
        let now = self.clock.now_millis();
        if token.issued_at_millis > now {
            return Err(TokenValidationError::new(TokenRejectReason::NotYetValid, "issued in the future"));
        }
        if token.expires_at_millis < now {
            return Err(TokenValidationError::new(TokenRejectReason::Expired, "transfer token expired"));
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticSecrets;
    use handoff_guard::ManualClock;

    // -- Helpers --

    fn setup() -> (Arc<ManualClock>, TransferTokenIssuer, TransferTokenValidator) {
        let clock = Arc::new(ManualClock::new(10_000));
        let secrets: Arc<dyn SecretSource> = Arc::new(StaticSecrets::new("transfer-secret"));
        let issuer = TransferTokenIssuer::new(secrets.clone(), clock.clone());
        let validator = TransferTokenValidator::new(secrets, clock.clone());
        (clock, issuer, validator)
    }

    // =========================================================================
    // validate
    // =========================================================================

    #[test]
    fn test_validate_fresh_token_accepted() {
        let (_, issuer, validator) = setup();
        let player = Uuid::from_u128(1);
        let encoded = issuer.issue(player, "arena").unwrap();
        let token = validator.validate(&encoded, player).unwrap();
        assert_eq!(token.target_server_id(), "arena");
        assert_eq!(token.expires_at_millis() - token.issued_at_millis(), DEFAULT_TRANSFER_TTL_MILLIS);
    }

    #[test]
    fn test_validate_after_ttl_expired() {
        let (clock, issuer, validator) = setup();
        let player = Uuid::from_u128(1);
        let encoded = issuer.issue(player, "arena").unwrap();
        clock.advance(DEFAULT_TRANSFER_TTL_MILLIS + 1);
        let err = validator.validate(&encoded, player).unwrap_err();
        assert_eq!(err.reason, TokenRejectReason::Expired);
    }

    #[test]
    fn test_validate_other_player_mismatch() {
        let (_, issuer, validator) = setup();
        let encoded = issuer.issue(Uuid::from_u128(1), "arena").unwrap();
        let err = validator.validate(&encoded, Uuid::from_u128(2)).unwrap_err();
        assert_eq!(err.reason, TokenRejectReason::TargetMismatch);
    }

    #[test]
    fn test_validate_proxy_token_prefix_malformed() {
        let (_, _, validator) = setup();
        let err = validator.validate("v1.aaaa.bbbb", Uuid::nil()).unwrap_err();
        assert_eq!(err.reason, TokenRejectReason::Malformed);
    }

    #[test]
    fn test_issue_referral_data_is_token_bytes() {
        let (_, issuer, validator) = setup();
        let player = Uuid::from_u128(9);
        let bytes = issuer.issue_referral_data(player, "arena").unwrap();
        let encoded = String::from_utf8(bytes).unwrap();
        assert!(encoded.starts_with("t1."));
        assert!(validator.validate(&encoded, player).is_ok());
    }
}
