//! The authenticated UDP messaging frame.
//!
//! ```text
//! [0x4C 0x4D][version:1][type:1][body][hmac:32]
//!
//! HANDSHAKE      body = timestamp_millis:i64 BE, nonce:16
//! HANDSHAKE_ACK  body = nonce:16
//! MESSAGE        body = channel_len:i32 BE, channel, payload_len:i32 BE, payload
//! ```
//!
//! The HMAC covers `version`, `type` and `body`, not the magic.

use crate::buf::{Reader, put_sized_bytes};
use crate::mac::{self, MAC_SIZE};
use crate::{NONCE_SIZE, WireError};

pub const MAGIC: [u8; 2] = [0x4C, 0x4D];
pub const VERSION: u8 = 1;
/// Longest channel id a MESSAGE frame may carry, in bytes.
pub const MAX_CHANNEL_LEN: usize = 1024;

const TYPE_HANDSHAKE: u8 = 1;
const TYPE_HANDSHAKE_ACK: u8 = 2;
const TYPE_MESSAGE: u8 = 3;

/// One decoded messaging datagram, without its MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingFrame {
    Handshake {
        timestamp_millis: i64,
        nonce: [u8; NONCE_SIZE],
    },
    HandshakeAck {
        nonce: [u8; NONCE_SIZE],
    },
    Message {
        channel: String,
        payload: Vec<u8>,
    },
}

/// A decoded frame together with the MAC it arrived with.
///
/// Decoding doesn't check the MAC; call [`SignedFrame::verify`] before
/// trusting the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedFrame {
    pub frame: MessagingFrame,
    pub mac: [u8; MAC_SIZE],
}

impl MessagingFrame {
    fn type_byte(&self) -> u8 {
        match self {
            Self::Handshake { .. } => TYPE_HANDSHAKE,
            Self::HandshakeAck { .. } => TYPE_HANDSHAKE_ACK,
            Self::Message { .. } => TYPE_MESSAGE,
        }
    }

    /// The bytes covered by the MAC: version, type, body.
    fn signed_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut out = vec![VERSION, self.type_byte()];
        match self {
            Self::Handshake {
                timestamp_millis,
                nonce,
            } => {
                out.extend_from_slice(&timestamp_millis.to_be_bytes());
                out.extend_from_slice(nonce);
            }
            Self::HandshakeAck { nonce } => out.extend_from_slice(nonce),
            Self::Message { channel, payload } => {
                if channel.is_empty() || channel.len() > MAX_CHANNEL_LEN {
                    return Err(WireError::InvalidChannel(channel.len()));
                }
                if payload.len() > i32::MAX as usize {
                    return Err(WireError::FrameTooLarge {
                        size: payload.len(),
                        max: i32::MAX as usize,
                    });
                }
                put_sized_bytes(&mut out, channel.as_bytes());
                put_sized_bytes(&mut out, payload);
            }
        }
        Ok(out)
    }

    /// Encodes and signs the frame with `secret`.
    pub fn encode(&self, secret: &[u8]) -> Result<Vec<u8>, WireError> {
        let signed = self.signed_bytes()?;
        let tag = mac::sign(secret, &[&signed]);
        let mut out = Vec::with_capacity(MAGIC.len() + signed.len() + MAC_SIZE);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&signed);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    /// Decodes a datagram. Unknown magic, version or type, a short
    /// buffer, or a body whose lengths don't add up all return `None`.
    pub fn decode(bytes: &[u8]) -> Option<SignedFrame> {
        let mut r = Reader::new(bytes);
        if r.array::<2>()? != MAGIC || r.u8()? != VERSION {
            return None;
        }
        let type_byte = r.u8()?;
        let body_len = r.remaining().checked_sub(MAC_SIZE)?;
        let mut body = Reader::new(r.take(body_len)?);
        let mac = r.array::<MAC_SIZE>()?;

        let frame = match type_byte {
            TYPE_HANDSHAKE => Self::Handshake {
                timestamp_millis: body.i64_be()?,
                nonce: body.array()?,
            },
            TYPE_HANDSHAKE_ACK => Self::HandshakeAck {
                nonce: body.array()?,
            },
            TYPE_MESSAGE => {
                let channel = body.sized_string()?;
                if channel.is_empty() || channel.len() > MAX_CHANNEL_LEN {
                    return None;
                }
                let payload = body.sized_bytes()?.to_vec();
                Self::Message { channel, payload }
            }
            _ => return None,
        };
        if !body.is_empty() {
            return None;
        }
        Some(SignedFrame { frame, mac })
    }
}

impl SignedFrame {
    /// Recomputes the MAC under `secret` and compares in constant time.
    pub fn verify(&self, secret: &[u8]) -> bool {
        match self.frame.signed_bytes() {
            Ok(signed) => mac::verify(secret, &[&signed], &self.mac),
            Err(_) => false,
        }
    }
}
