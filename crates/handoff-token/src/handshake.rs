//! Backend handshake interception: referral bytes in, verdict out.

use std::sync::Arc;

use handoff_guard::{Clock, ReplayConfig, ReplayProtector};
use handoff_wire::TokenRejectReason;
use uuid::Uuid;

use crate::{ProxyTokenValidator, ReplayKey, TokenValidationError, ValidatedToken};

/// What a rejected client is told. The real reason only goes to logs.
pub const REJECTED_CLIENT_MESSAGE: &str = "Connection rejected by proxy policy.";

/// Runs the full proxy-token check for one incoming backend connection,
/// including the replay step the validator can't do alone.
pub struct HandshakeInterceptor {
    validator: ProxyTokenValidator,
    replay: ReplayProtector<ReplayKey>,
}

impl HandshakeInterceptor {
    pub fn new(validator: ProxyTokenValidator, replay: ReplayConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            validator,
            replay: ReplayProtector::new(replay, clock),
        }
    }

    pub fn server_id(&self) -> &str {
        self.validator.server_id()
    }

    /// Validates the referral data a client presented. Surrounding ASCII
    /// whitespace is ignored; missing or empty data is malformed.
    pub fn intercept(&self, referral_data: Option<&[u8]>) -> Result<ValidatedToken, TokenValidationError> {
        self.intercept_for_player(referral_data, None)
    }

    /// Like [`intercept`](Self::intercept), but a token issued to anyone
    /// other than `claimed_player` fails as `TARGET_MISMATCH`. The player
    /// check runs before the replay step, so a mismatched frame never
    /// consumes the token.
    pub fn intercept_for_player(
        &self,
        referral_data: Option<&[u8]>,
        claimed_player: Option<Uuid>,
    ) -> Result<ValidatedToken, TokenValidationError> {
        let data = referral_data.map(<[u8]>::trim_ascii).unwrap_or_default();
        if data.is_empty() {
            return Err(TokenValidationError::malformed("no referral data"));
        }
        let encoded = std::str::from_utf8(data)
            .map_err(|_| TokenValidationError::malformed("referral data is not UTF-8"))?;

        let validated = self.validator.validate(encoded)?;
        if let Some(claimed) = claimed_player {
            if claimed != validated.token.player_id() {
                return Err(TokenValidationError::new(
                    TokenRejectReason::TargetMismatch,
                    "token issued for another player",
                ));
            }
        }
        if !self.replay.try_register(validated.replay_key.clone()) {
            return Err(TokenValidationError::new(
                TokenRejectReason::Replayed,
                "token already used on this backend",
            ));
        }
        tracing::debug!(player_id = %validated.token.player_id(), "proxy token accepted");
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProxyToken, StaticSecrets};
    use handoff_guard::ManualClock;

    fn interceptor(clock: Arc<ManualClock>) -> HandshakeInterceptor {
        let validator = ProxyTokenValidator::new("survival", Arc::new(StaticSecrets::new("k")), clock.clone())
            .require_certificates(false);
        HandshakeInterceptor::new(validator, ReplayConfig::default(), clock)
    }

    fn encoded(nonce: &str) -> String {
        ProxyToken::new(1, Uuid::from_u128(5), "survival", 0, 60_000, None, None, Some(nonce.into()))
            .unwrap()
            .encode(b"k")
    }

    #[test]
    fn test_intercept_second_use_is_replayed() {
        let i = interceptor(Arc::new(ManualClock::new(100)));
        let token = encoded("a");
        assert!(i.intercept(Some(token.as_bytes())).is_ok());
        let err = i.intercept(Some(token.as_bytes())).unwrap_err();
        assert_eq!(err.reason, TokenRejectReason::Replayed);
    }

    #[test]
    fn test_intercept_distinct_nonces_both_accepted() {
        let i = interceptor(Arc::new(ManualClock::new(100)));
        assert!(i.intercept(Some(encoded("a").as_bytes())).is_ok());
        assert!(i.intercept(Some(encoded("b").as_bytes())).is_ok());
    }

    #[test]
    fn test_intercept_trims_whitespace() {
        let i = interceptor(Arc::new(ManualClock::new(100)));
        let padded = format!("  {}\n", encoded("a"));
        assert!(i.intercept(Some(padded.as_bytes())).is_ok());
    }

    #[test]
    fn test_intercept_missing_or_blank_is_malformed() {
        let i = interceptor(Arc::new(ManualClock::new(100)));
        assert_eq!(i.intercept(None).unwrap_err().reason, TokenRejectReason::Malformed);
        assert_eq!(i.intercept(Some(b"   ".as_slice())).unwrap_err().reason, TokenRejectReason::Malformed);
    }

    #[test]
    fn test_intercept_for_player_mismatch_leaves_token_usable() {
        let i = interceptor(Arc::new(ManualClock::new(100)));
        let token = encoded("a");
        let err = i
            .intercept_for_player(Some(token.as_bytes()), Some(Uuid::from_u128(6)))
            .unwrap_err();
        assert_eq!(err.reason, TokenRejectReason::TargetMismatch);

        let validated = i
            .intercept_for_player(Some(token.as_bytes()), Some(Uuid::from_u128(5)))
            .unwrap();
        assert_eq!(validated.token.player_id(), Uuid::from_u128(5));
        assert_eq!(
            i.intercept_for_player(Some(token.as_bytes()), Some(Uuid::from_u128(5)))
                .unwrap_err()
                .reason,
            TokenRejectReason::Replayed
        );
    }

    #[test]
    fn test_intercept_rejected_token_is_not_registered() {
        let clock = Arc::new(ManualClock::new(100));
        let i = interceptor(clock.clone());
        let token = ProxyToken::new(1, Uuid::from_u128(5), "survival", 500, 60_000, None, None, Some("x".into()))
            .unwrap()
            .encode(b"k");
        assert_eq!(
            i.intercept(Some(token.as_bytes())).unwrap_err().reason,
            TokenRejectReason::NotYetValid
        );
        clock.set(600);
        assert!(i.intercept(Some(token.as_bytes())).is_ok());
    }
}
