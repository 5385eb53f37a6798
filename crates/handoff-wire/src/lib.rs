//! Binary wire codecs for the handoff proxy.
//!
//! Every byte that crosses a process boundary goes through this crate:
//!
//! 1. **VarInt** ([`varint`]): 7-bits-per-byte integers used for
//!    length prefixes in the connect frame.
//! 2. **Connect frame** ([`ConnectFrame`]): the first packet a game client
//!    sends, rewritten by the proxy with referral data before it is
//!    forwarded to a backend.
//! 3. **Messaging frame** ([`MessagingFrame`]): the HMAC-authenticated
//!    UDP datagram that carries channel traffic between proxy and backends.
//! 4. **Control envelope** ([`ControlEnvelope`]) and its typed payloads:
//!    transfer requests/results, token-validation notices, backend status.
//!
//! # How it fits in the stack
//!
//! ```text
//! Token / Control / Transport layers (above)  ← never touch raw bytes
//!     ↕
//! Wire layer (this crate)  ← encode is fallible, decode is total
//! ```
//!
//! # Decoding never panics
//!
//! Decoders take arbitrary network input and return `Option`: `None`
//! means "not decodable". Encoders validate their input against the
//! same limits and return [`WireError`] when a value can't be framed.

mod buf;
mod connect;
mod control;
mod error;
pub mod mac;
mod messaging;
mod payload;
pub mod varint;

pub use connect::{ConnectFrame, HostAddress, ProtocolLimits};
pub use control::{ControlEnvelope, ControlMessageType, MAX_SENDER_ID_LEN, VERSION as CONTROL_VERSION};
pub use error::WireError;
pub use messaging::{MessagingFrame, SignedFrame};
pub use payload::{
    BackendStatus, BackendStatusNotice, TokenRejectReason, TokenValidationNotice,
    TransferFailureReason, TransferRequest, TransferResult, TransferStatus,
    ValidationOutcome,
};

/// Size in bytes of every random nonce on the wire.
pub const NONCE_SIZE: usize = 16;
