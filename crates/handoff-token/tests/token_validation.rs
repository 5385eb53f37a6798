//! End-to-end token issuance and validation through the public API.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use handoff_guard::{ManualClock, ReplayConfig};
use handoff_token::{
    HandshakeInterceptor, ProxyTokenIssuer, ProxyTokenValidator, RotatingSecrets, SecretSource,
    StaticSecrets, TokenRejectReason,
};
use proptest::prelude::*;
use uuid::Uuid;

const CURRENT: &str = "current-secret-0123456789abcdefghij";
const PREVIOUS: &str = "previous-secret-0123456789abcdefgh";

// -- Helpers --

fn issue_with(secret: &str, clock: Arc<ManualClock>) -> String {
    ProxyTokenIssuer::new(Arc::new(StaticSecrets::new(secret)), clock, 60_000)
        .issue(Uuid::from_u128(11), "survival", Some("client-fp".into()), Some("proxy-fp".into()))
        .unwrap()
}

fn validator_with(secrets: Arc<dyn SecretSource>, clock: Arc<ManualClock>) -> ProxyTokenValidator {
    ProxyTokenValidator::new("survival", secrets, clock)
}

/// Re-encodes `token` with one decoded byte of part `part` flipped.
fn corrupt(token: &str, part: usize, index: usize) -> String {
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let mut bytes = URL_SAFE_NO_PAD.decode(&parts[part]).unwrap();
    let i = index % bytes.len();
    bytes[i] ^= 0x01;
    parts[part] = URL_SAFE_NO_PAD.encode(bytes);
    parts.join(".")
}

// =========================================================================
// Secret rotation
// =========================================================================

#[test]
fn test_rotation_previous_secret_accepted_until_dropped() {
    let clock = Arc::new(ManualClock::new(1_000));
    let token = issue_with(PREVIOUS, clock.clone());

    let both = Arc::new(StaticSecrets::new(CURRENT).with_previous(PREVIOUS));
    assert!(validator_with(both, clock.clone()).validate(&token).is_ok());

    let current_only = Arc::new(StaticSecrets::new(CURRENT));
    let err = validator_with(current_only, clock).validate(&token).unwrap_err();
    assert_eq!(err.reason, TokenRejectReason::InvalidSignature);
}

#[test]
fn test_rotation_live_rotate_then_retire() {
    let clock = Arc::new(ManualClock::new(1_000));
    let secrets = Arc::new(RotatingSecrets::new(StaticSecrets::new(PREVIOUS)));
    let issuer = ProxyTokenIssuer::new(secrets.clone(), clock.clone(), 60_000);
    let validator = validator_with(secrets.clone(), clock);

    let old_token = issuer
        .issue(Uuid::from_u128(1), "survival", Some("c".into()), Some("p".into()))
        .unwrap();
    secrets.rotate(CURRENT);
    let new_token = issuer
        .issue(Uuid::from_u128(1), "survival", Some("c".into()), Some("p".into()))
        .unwrap();

    assert!(validator.validate(&old_token).is_ok());
    assert!(validator.validate(&new_token).is_ok());

    secrets.retire_previous();
    assert_eq!(
        validator.validate(&old_token).unwrap_err().reason,
        TokenRejectReason::InvalidSignature
    );
    assert!(validator.validate(&new_token).is_ok());
}

// =========================================================================
// Determinism
// =========================================================================

#[test]
fn test_same_token_same_classification_every_time() {
    let clock = Arc::new(ManualClock::new(1_000));
    let token = issue_with(CURRENT, clock.clone());
    clock.advance(120_000);
    let validator = validator_with(Arc::new(StaticSecrets::new(CURRENT)), clock);
    for _ in 0..10 {
        assert_eq!(validator.validate(&token).unwrap_err().reason, TokenRejectReason::Expired);
    }
}

#[test]
fn test_handshake_replay_after_successful_validation() {
    let clock = Arc::new(ManualClock::new(1_000));
    let token = issue_with(CURRENT, clock.clone());
    let interceptor = HandshakeInterceptor::new(
        validator_with(Arc::new(StaticSecrets::new(CURRENT)), clock.clone()),
        ReplayConfig::default(),
        clock,
    );
    assert!(interceptor.intercept(Some(token.as_bytes())).is_ok());
    assert_eq!(
        interceptor.intercept(Some(token.as_bytes())).unwrap_err().reason,
        TokenRejectReason::Replayed
    );
}

proptest! {
    #[test]
    fn single_byte_corruption_is_always_a_signature_failure(part in 1usize..=2, index in any::<usize>()) {
        let clock = Arc::new(ManualClock::new(1_000));
        let token = issue_with(CURRENT, clock.clone());
        let validator = validator_with(Arc::new(StaticSecrets::new(CURRENT)), clock);
        let corrupted = corrupt(&token, part, index);
        prop_assert_eq!(validator.validate(&corrupted).unwrap_err().reason, TokenRejectReason::InvalidSignature);
    }
}
