//! The client connect frame.
//!
//! Layout (integers little-endian, strings are varint-length UTF-8):
//!
//! ```text
//! protocol_crc:u32 protocol_build:u32 client_version:str client_type:u8
//! language:str presence:u8
//! [identity_token:str] [player_id:16] [username:str]
//! [referral_data:varint+bytes] [referral_port:u16 referral_host:str]
//! ```
//!
//! Optional fields appear in that order, each only when its presence bit
//! is set. The proxy decodes what the client sent, then re-encodes the
//! frame with referral data attached before forwarding it to a backend.

use std::fmt;

use serde::Deserialize;
use uuid::Uuid;

use crate::WireError;
use crate::buf::{Reader, put_var_bytes};

const HAS_IDENTITY_TOKEN: u8 = 0x01;
const HAS_PLAYER_ID: u8 = 0x02;
const HAS_USERNAME: u8 = 0x04;
const HAS_REFERRAL_DATA: u8 = 0x08;
const HAS_REFERRAL_SOURCE: u8 = 0x10;
const KNOWN_BITS: u8 = 0x1F;

// ---------------------------------------------------------------------------
// ProtocolLimits
// ---------------------------------------------------------------------------

/// Per-field byte limits applied by both encode and decode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProtocolLimits {
    pub max_client_version_len: usize,
    pub max_language_len: usize,
    pub max_identity_token_len: usize,
    pub max_username_len: usize,
    pub max_referral_data_len: usize,
    pub max_host_len: usize,
    /// Upper bound for the whole frame, checked before anything is parsed.
    pub max_frame_size: usize,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            max_client_version_len: 64,
            max_language_len: 128,
            max_identity_token_len: 8192,
            max_username_len: 16,
            max_referral_data_len: 4096,
            max_host_len: 256,
            max_frame_size: 38_161,
        }
    }
}

// ---------------------------------------------------------------------------
// HostAddress
// ---------------------------------------------------------------------------

/// A `host:port` pair as carried in the referral source field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
}

impl HostAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// ConnectFrame
// ---------------------------------------------------------------------------

/// The handshake a game client opens every connection with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFrame {
    pub protocol_crc: u32,
    pub protocol_build: u32,
    pub client_version: String,
    pub client_type: u8,
    pub language: String,
    pub identity_token: Option<String>,
    pub player_id: Option<Uuid>,
    pub username: Option<String>,
    /// Opaque bytes the proxy attaches for the backend (a signed token).
    pub referral_data: Option<Vec<u8>>,
    /// Where the referral came from.
    pub referral_source: Option<HostAddress>,
}

impl ConnectFrame {
    /// Returns a copy carrying `data` as referral data from `source`.
    pub fn with_referral(mut self, data: Vec<u8>, source: HostAddress) -> Self {
        self.referral_data = Some(data);
        self.referral_source = Some(source);
        self
    }

    /// Encodes the frame, enforcing the same limits decode applies.
    pub fn encode(&self, limits: &ProtocolLimits) -> Result<Vec<u8>, WireError> {
        check_len("client_version", self.client_version.len(), limits.max_client_version_len)?;
        check_len("language", self.language.len(), limits.max_language_len)?;

        let mut presence = 0u8;
        if let Some(token) = &self.identity_token {
            check_len("identity_token", token.len(), limits.max_identity_token_len)?;
            presence |= HAS_IDENTITY_TOKEN;
        }
        if self.player_id.is_some() {
            presence |= HAS_PLAYER_ID;
        }
        if let Some(username) = &self.username {
            check_len("username", username.len(), limits.max_username_len)?;
            presence |= HAS_USERNAME;
        }
        if let Some(data) = &self.referral_data {
            check_len("referral_data", data.len(), limits.max_referral_data_len)?;
            presence |= HAS_REFERRAL_DATA;
        }
        if let Some(source) = &self.referral_source {
            check_len("referral_host", source.host.len(), limits.max_host_len)?;
            presence |= HAS_REFERRAL_SOURCE;
        }

        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&self.protocol_crc.to_le_bytes());
        out.extend_from_slice(&self.protocol_build.to_le_bytes());
        put_var_bytes(&mut out, self.client_version.as_bytes());
        out.push(self.client_type);
        put_var_bytes(&mut out, self.language.as_bytes());
        out.push(presence);

        if let Some(token) = &self.identity_token {
            put_var_bytes(&mut out, token.as_bytes());
        }
        if let Some(player_id) = &self.player_id {
            out.extend_from_slice(player_id.as_bytes());
        }
        if let Some(username) = &self.username {
            put_var_bytes(&mut out, username.as_bytes());
        }
        if let Some(data) = &self.referral_data {
            put_var_bytes(&mut out, data);
        }
        if let Some(source) = &self.referral_source {
            out.extend_from_slice(&source.port.to_le_bytes());
            put_var_bytes(&mut out, source.host.as_bytes());
        }

        if out.len() > limits.max_frame_size {
            return Err(WireError::FrameTooLarge {
                size: out.len(),
                max: limits.max_frame_size,
            });
        }
        Ok(out)
    }

    /// Decodes a frame. Any limit violation, unknown presence bit,
    /// truncation or trailing byte makes the frame undecodable.
    pub fn decode(bytes: &[u8], limits: &ProtocolLimits) -> Option<Self> {
        if bytes.len() > limits.max_frame_size {
            return None;
        }
        let mut r = Reader::new(bytes);

        let protocol_crc = r.u32_le()?;
        let protocol_build = r.u32_le()?;
        let client_version = r.var_string(limits.max_client_version_len)?;
        let client_type = r.u8()?;
        let language = r.var_string(limits.max_language_len)?;
        let presence = r.u8()?;
        if presence & !KNOWN_BITS != 0 {
            return None;
        }

        let identity_token = if presence & HAS_IDENTITY_TOKEN != 0 {
            Some(r.var_string(limits.max_identity_token_len)?)
        } else {
            None
        };
        let player_id = if presence & HAS_PLAYER_ID != 0 {
            Some(r.uuid()?)
        } else {
            None
        };
        let username = if presence & HAS_USERNAME != 0 {
            Some(r.var_string(limits.max_username_len)?)
        } else {
            None
        };
        let referral_data = if presence & HAS_REFERRAL_DATA != 0 {
            Some(r.var_bytes(limits.max_referral_data_len)?.to_vec())
        } else {
            None
        };
        let referral_source = if presence & HAS_REFERRAL_SOURCE != 0 {
            let port = r.u16_le()?;
            let host = r.var_string(limits.max_host_len)?;
            Some(HostAddress { host, port })
        } else {
            None
        };

        if !r.is_empty() {
            return None;
        }

        Some(Self {
            protocol_crc,
            protocol_build,
            client_version,
            client_type,
            language,
            identity_token,
            player_id,
            username,
            referral_data,
            referral_source,
        })
    }
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), WireError> {
    if len > max {
        return Err(WireError::FieldTooLong { field, len, max });
    }
    Ok(())
}
