//! Signed tokens for the handoff proxy.
//!
//! Two token kinds share one string format:
//!
//! ```text
//! <prefix>.<base64url(payload)>.<base64url(hmac_sha256(payload))>
//!
//! v1  proxy token     "this player was authenticated by the proxy"
//! t1  transfer token  "this player may move to that backend" (short-lived)
//! ```
//!
//! The proxy issues with its current secret; validators accept a list
//! of secrets (current plus previous) so a secret can be rotated
//! without invalidating tokens already in flight.
//!
//! # How it fits in the stack
//!
//! ```text
//! Proxy facade / backend node (above)  ← issue on connect, validate on handshake
//!     ↕
//! Token layer (this crate)
//!     ↕
//! Wire (HMAC, reject reasons) + Guard (clock, replay protector) (below)
//! ```
//!
//! Validation failures are never parse exceptions: they are a
//! [`TokenValidationError`] carrying a stable [`TokenRejectReason`].

mod claims;
mod encoding;
mod error;
pub mod fingerprint;
mod handshake;
mod proxy;
mod secret;
mod transfer;
mod validator;

pub use error::{TokenError, TokenValidationError};
pub use handoff_wire::TokenRejectReason;
pub use handshake::{HandshakeInterceptor, REJECTED_CLIENT_MESSAGE};
pub use proxy::{PROXY_TOKEN_PREFIX, ProxyToken, ProxyTokenIssuer};
pub use secret::{RotatingSecrets, Secret, SecretSource, StaticSecrets, check_secret_strength};
pub use transfer::{
    DEFAULT_TRANSFER_TTL_MILLIS, TRANSFER_TOKEN_PREFIX, TransferToken, TransferTokenIssuer,
    TransferTokenValidator,
};
pub use validator::{ProxyTokenValidator, ReplayKey, ValidatedToken};

/// Claim version written by the issuers and accepted by the validators.
pub const CURRENT_TOKEN_VERSION: u32 = 1;
