//! The control-plane envelope.
//!
//! ```text
//! [0x4C 0x43][version:1][type:1][sender_len:1][sender]
//! [issued_at:i64 BE][ttl:i64 BE][nonce:16][payload_len:i32 BE][payload]
//! ```
//!
//! `payload_len` must equal the number of bytes left, exactly. Anything
//! shorter is truncation, anything longer is padding; both are rejected.

use std::fmt;

use crate::buf::Reader;
use crate::{NONCE_SIZE, WireError};

pub const MAGIC: [u8; 2] = [0x4C, 0x43];
pub const VERSION: u8 = 1;
pub const MAX_SENDER_ID_LEN: usize = 64;

/// What an envelope's payload contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMessageType {
    TransferRequest,
    TransferResult,
    TokenValidation,
    BackendStatus,
}

impl ControlMessageType {
    pub fn code(self) -> u8 {
        match self {
            Self::TransferRequest => 1,
            Self::TransferResult => 2,
            Self::TokenValidation => 3,
            Self::BackendStatus => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::TransferRequest),
            2 => Some(Self::TransferResult),
            3 => Some(Self::TokenValidation),
            4 => Some(Self::BackendStatus),
            _ => None,
        }
    }
}

impl fmt::Display for ControlMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferRequest => write!(f, "TRANSFER_REQUEST"),
            Self::TransferResult => write!(f, "TRANSFER_RESULT"),
            Self::TokenValidation => write!(f, "TOKEN_VALIDATION"),
            Self::BackendStatus => write!(f, "BACKEND_STATUS"),
        }
    }
}

/// One control-plane message. Built fresh for every send, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEnvelope {
    /// Written as-is by [`encode`](Self::encode); decode only accepts [`VERSION`].
    pub version: u8,
    pub message_type: ControlMessageType,
    pub sender_id: String,
    pub issued_at_millis: i64,
    pub ttl_millis: i64,
    pub nonce: [u8; NONCE_SIZE],
    pub payload: Vec<u8>,
}

impl ControlEnvelope {
    /// An envelope at the current protocol [`VERSION`].
    pub fn new(
        message_type: ControlMessageType,
        sender_id: impl Into<String>,
        issued_at_millis: i64,
        ttl_millis: i64,
        nonce: [u8; NONCE_SIZE],
        payload: Vec<u8>,
    ) -> Self {
        Self {
            version: VERSION,
            message_type,
            sender_id: sender_id.into(),
            issued_at_millis,
            ttl_millis,
            nonce,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.sender_id.trim().is_empty() {
            return Err(WireError::BlankField("sender_id"));
        }
        if self.sender_id.len() > MAX_SENDER_ID_LEN {
            return Err(WireError::FieldTooLong {
                field: "sender_id",
                len: self.sender_id.len(),
                max: MAX_SENDER_ID_LEN,
            });
        }
        let payload_len = i32::try_from(self.payload.len()).map_err(|_| WireError::FrameTooLarge {
            size: self.payload.len(),
            max: i32::MAX as usize,
        })?;

        let mut out = Vec::with_capacity(
            MAGIC.len() + 3 + self.sender_id.len() + 16 + NONCE_SIZE + 4 + self.payload.len(),
        );
        out.extend_from_slice(&MAGIC);
        out.push(self.version);
        out.push(self.message_type.code());
        out.push(self.sender_id.len() as u8);
        out.extend_from_slice(self.sender_id.as_bytes());
        out.extend_from_slice(&self.issued_at_millis.to_be_bytes());
        out.extend_from_slice(&self.ttl_millis.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&payload_len.to_be_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        if r.array::<2>()? != MAGIC {
            return None;
        }
        let version = r.u8()?;
        if version != VERSION {
            return None;
        }
        let message_type = ControlMessageType::from_code(r.u8()?)?;

        let sender_len = r.u8()? as usize;
        if sender_len == 0 || sender_len > MAX_SENDER_ID_LEN {
            return None;
        }
        let sender_id = String::from_utf8(r.take(sender_len)?.to_vec()).ok()?;

        let issued_at_millis = r.i64_be()?;
        let ttl_millis = r.i64_be()?;
        let nonce = r.array::<NONCE_SIZE>()?;

        let payload_len = usize::try_from(r.i32_be()?).ok()?;
        if payload_len != r.remaining() {
            return None;
        }
        let payload = r.take(payload_len)?.to_vec();

        Some(Self {
            version,
            message_type,
            sender_id,
            issued_at_millis,
            ttl_millis,
            nonce,
            payload,
        })
    }

    /// `true` if `now_millis` lies within `[issued_at, issued_at + ttl]`
    /// widened by `max_skew_millis` on both sides. A non-positive TTL is
    /// never valid.
    pub fn is_timestamp_valid(&self, now_millis: i64, max_skew_millis: i64) -> bool {
        if self.ttl_millis <= 0 {
            return false;
        }
        let earliest = self.issued_at_millis.saturating_sub(max_skew_millis);
        let latest = self
            .issued_at_millis
            .saturating_add(self.ttl_millis)
            .saturating_add(max_skew_millis);
        (earliest..=latest).contains(&now_millis)
    }
}
