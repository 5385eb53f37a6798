//! Proxy tokens: "the proxy authenticated this player for that backend".

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use handoff_guard::Clock;
use rand::RngCore;
use uuid::Uuid;

use crate::encoding::{self, RawToken};
use crate::{CURRENT_TOKEN_VERSION, SecretSource, TokenError, TokenValidationError, claims};

pub const PROXY_TOKEN_PREFIX: &str = "v1";

const FIELD_COUNT: usize = 8;
const NONCE_BYTES: usize = 16;

/// The claims of a proxy token. Immutable once built.
///
/// Payload field order, which the signature covers byte for byte:
/// `version|player_id|target_server_id|issued_at|expires_at|client_cert|proxy_cert|nonce`,
/// with an empty field for each absent optional claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyToken {
    version: u32,
    player_id: Uuid,
    target_server_id: String,
    issued_at_millis: i64,
    expires_at_millis: i64,
    client_cert_fingerprint: Option<String>,
    proxy_cert_fingerprint: Option<String>,
    nonce: Option<String>,
}

impl ProxyToken {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u32,
        player_id: Uuid,
        target_server_id: impl Into<String>,
        issued_at_millis: i64,
        expires_at_millis: i64,
        client_cert_fingerprint: Option<String>,
        proxy_cert_fingerprint: Option<String>,
        nonce: Option<String>,
    ) -> Result<Self, TokenError> {
        let target_server_id = target_server_id.into();
        claims::check_id("target_server_id", &target_server_id)?;
        claims::check_times(issued_at_millis, expires_at_millis)?;
        claims::check_optional("client_cert_fingerprint", client_cert_fingerprint.as_deref())?;
        claims::check_optional("proxy_cert_fingerprint", proxy_cert_fingerprint.as_deref())?;
        claims::check_optional("nonce", nonce.as_deref())?;
        Ok(Self {
            version,
            player_id,
            target_server_id,
            issued_at_millis,
            expires_at_millis,
            client_cert_fingerprint,
            proxy_cert_fingerprint,
            nonce,
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

    pub fn client_cert_fingerprint(&self) -> Option<&str> {
        self.client_cert_fingerprint.as_deref()
    }

    pub fn proxy_cert_fingerprint(&self) -> Option<&str> {
        self.proxy_cert_fingerprint.as_deref()
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn encode(&self, secret: &[u8]) -> String {
        encoding::encode(PROXY_TOKEN_PREFIX, &self.payload(), secret)
    }

    fn payload(&self) -> Vec<u8> {
        let version = self.version.to_string();
        let player = self.player_id.to_string();
        let issued = self.issued_at_millis.to_string();
        let expires = self.expires_at_millis.to_string();
        claims::join(&[
            &version,
            &player,
            &self.target_server_id,
            &issued,
            &expires,
            self.client_cert_fingerprint.as_deref().unwrap_or_default(),
            self.proxy_cert_fingerprint.as_deref().unwrap_or_default(),
            self.nonce.as_deref().unwrap_or_default(),
        ])
    }

    /// Splits an encoded token without checking its signature.
    pub(crate) fn decode_raw(encoded: &str) -> Result<RawToken, TokenValidationError> {
        encoding::decode(encoded, PROXY_TOKEN_PREFIX)
    }

    /// Parses claims out of a payload whose signature already checked out.
    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, TokenValidationError> {
        let malformed = || TokenValidationError::malformed("unparseable proxy token claims");
        let parts = claims::split(payload, FIELD_COUNT).ok_or_else(malformed)?;
        let version = parts[0].parse().map_err(|_| malformed())?;
        let player_id = Uuid::parse_str(parts[1]).map_err(|_| malformed())?;
        let issued_at = parts[3].parse().map_err(|_| malformed())?;
        let expires_at = parts[4].parse().map_err(|_| malformed())?;
        Self::new(
            version,
            player_id,
            parts[2],
            issued_at,
            expires_at,
            claims::optional(parts[5]),
            claims::optional(parts[6]),
            claims::optional(parts[7]),
        )
        .map_err(|e| TokenValidationError::malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ProxyTokenIssuer
// ---------------------------------------------------------------------------

/// Issues proxy tokens with a fixed TTL and a fresh random nonce.
pub struct ProxyTokenIssuer {
    secrets: Arc<dyn SecretSource>,
    clock: Arc<dyn Clock>,
    ttl_millis: i64,
}

impl ProxyTokenIssuer {
    pub fn new(secrets: Arc<dyn SecretSource>, clock: Arc<dyn Clock>, ttl_millis: i64) -> Self {
        Self {
            secrets,
            clock,
            ttl_millis: ttl_millis.max(1),
        }
    }

    pub fn issue(
        &self,
        player_id: Uuid,
        target_server_id: &str,
        client_cert_fingerprint: Option<String>,
        proxy_cert_fingerprint: Option<String>,
    ) -> Result<String, TokenError> {
        let now = self.clock.now_millis();
        let mut nonce = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut nonce);
        let token = ProxyToken::new(
            CURRENT_TOKEN_VERSION,
            player_id,
            target_server_id,
            now,
            now.saturating_add(self.ttl_millis),
            client_cert_fingerprint,
            proxy_cert_fingerprint,
            Some(URL_SAFE_NO_PAD.encode(nonce)),
        )?;
        tracing::debug!(%player_id, target = target_server_id, "proxy token issued");
        Ok(token.encode(&self.secrets.signing_secret()))
    }
}
