//! Typed payloads carried inside a [`ControlEnvelope`](crate::ControlEnvelope).
//!
//! UUIDs are 16 raw bytes, strings and blobs carry an `i32` big-endian
//! length prefix. Every decoder requires the buffer to be consumed
//! exactly.

use std::fmt;

use uuid::Uuid;

use crate::WireError;
use crate::buf::{Reader, put_sized_bytes};

/// Generates `code()` / `from_code()` for a wire enum.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident = $code:literal => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $label)),+
                }
            }
        }
    };
}

/// Why a backend refused a proxy token. Shared by the token validator
/// and the token-validation notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenRejectReason {
    Malformed,
    InvalidSignature,
    Expired,
    NotYetValid,
    UnsupportedVersion,
    TargetMismatch,
    Replayed,
}

wire_enum!(TokenRejectReason {
    Malformed = 1 => "MALFORMED",
    InvalidSignature = 2 => "INVALID_SIGNATURE",
    Expired = 3 => "EXPIRED",
    NotYetValid = 4 => "NOT_YET_VALID",
    UnsupportedVersion = 5 => "UNSUPPORTED_VERSION",
    TargetMismatch = 6 => "TARGET_MISMATCH",
    Replayed = 7 => "REPLAYED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    Ok,
    Failed,
}

wire_enum!(TransferStatus {
    Ok = 1 => "OK",
    Failed = 2 => "FAILED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferFailureReason {
    BackendNotFound,
    ReferralRejected,
    InternalError,
    PlayerNotFound,
}

wire_enum!(TransferFailureReason {
    BackendNotFound = 1 => "BACKEND_NOT_FOUND",
    ReferralRejected = 2 => "REFERRAL_REJECTED",
    InternalError = 3 => "INTERNAL_ERROR",
    PlayerNotFound = 4 => "PLAYER_NOT_FOUND",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationOutcome {
    Accepted,
    Rejected,
}

wire_enum!(ValidationOutcome {
    Accepted = 1 => "ACCEPTED",
    Rejected = 2 => "REJECTED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendStatus {
    Online,
    Offline,
}

wire_enum!(BackendStatus {
    Online = 1 => "ONLINE",
    Offline = 2 => "OFFLINE",
});

// ---------------------------------------------------------------------------
// TransferRequest
// ---------------------------------------------------------------------------

/// Proxy → backend: "move this player to `target_backend_id`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub correlation_id: Uuid,
    pub player_id: Uuid,
    pub target_backend_id: String,
    /// Handed verbatim to the backend's redirect mechanism.
    pub referral_data: Vec<u8>,
}

impl TransferRequest {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.target_backend_id.trim().is_empty() {
            return Err(WireError::BlankField("target_backend_id"));
        }
        let mut out = Vec::with_capacity(40 + self.target_backend_id.len() + self.referral_data.len());
        out.extend_from_slice(self.correlation_id.as_bytes());
        out.extend_from_slice(self.player_id.as_bytes());
        put_sized_bytes(&mut out, self.target_backend_id.as_bytes());
        put_sized_bytes(&mut out, &self.referral_data);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let correlation_id = r.uuid()?;
        let player_id = r.uuid()?;
        let target_backend_id = r.sized_string()?;
        if target_backend_id.trim().is_empty() {
            return None;
        }
        let referral_data = r.sized_bytes()?.to_vec();
        r.is_empty().then_some(Self {
            correlation_id,
            player_id,
            target_backend_id,
            referral_data,
        })
    }
}

// ---------------------------------------------------------------------------
// TransferResult
// ---------------------------------------------------------------------------

/// Backend → proxy answer to a [`TransferRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferResult {
    pub correlation_id: Uuid,
    pub status: TransferStatus,
    /// Present only when `status` is `Failed`.
    pub reason: Option<TransferFailureReason>,
}

impl TransferResult {
    pub fn ok(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            status: TransferStatus::Ok,
            reason: None,
        }
    }

    pub fn failed(correlation_id: Uuid, reason: TransferFailureReason) -> Self {
        Self {
            correlation_id,
            status: TransferStatus::Failed,
            reason: Some(reason),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18);
        out.extend_from_slice(self.correlation_id.as_bytes());
        out.push(self.status.code());
        out.push(self.reason.map_or(0, TransferFailureReason::code));
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let correlation_id = r.uuid()?;
        let status = TransferStatus::from_code(r.u8()?)?;
        let reason = optional_code(r.u8()?, TransferFailureReason::from_code)?;
        r.is_empty().then_some(Self {
            correlation_id,
            status,
            reason,
        })
    }
}

// ---------------------------------------------------------------------------
// TokenValidationNotice
// ---------------------------------------------------------------------------

/// Backend → proxy: the outcome of validating a player's proxy token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidationNotice {
    pub player_id: Uuid,
    pub backend_id: String,
    pub outcome: ValidationOutcome,
    pub reason: Option<TokenRejectReason>,
}

impl TokenValidationNotice {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.backend_id.trim().is_empty() {
            return Err(WireError::BlankField("backend_id"));
        }
        let mut out = Vec::with_capacity(24 + self.backend_id.len());
        out.extend_from_slice(self.player_id.as_bytes());
        put_sized_bytes(&mut out, self.backend_id.as_bytes());
        out.push(self.outcome.code());
        out.push(self.reason.map_or(0, TokenRejectReason::code));
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let player_id = r.uuid()?;
        let backend_id = r.sized_string()?;
        if backend_id.trim().is_empty() {
            return None;
        }
        let outcome = ValidationOutcome::from_code(r.u8()?)?;
        let reason = optional_code(r.u8()?, TokenRejectReason::from_code)?;
        r.is_empty().then_some(Self {
            player_id,
            backend_id,
            outcome,
            reason,
        })
    }
}

// ---------------------------------------------------------------------------
// BackendStatusNotice
// ---------------------------------------------------------------------------

/// Backend → proxy availability announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatusNotice {
    pub backend_id: String,
    pub status: BackendStatus,
}

impl BackendStatusNotice {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.backend_id.trim().is_empty() {
            return Err(WireError::BlankField("backend_id"));
        }
        let mut out = Vec::with_capacity(5 + self.backend_id.len());
        put_sized_bytes(&mut out, self.backend_id.as_bytes());
        out.push(self.status.code());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let backend_id = r.sized_string()?;
        if backend_id.trim().is_empty() {
            return None;
        }
        let status = BackendStatus::from_code(r.u8()?)?;
        r.is_empty().then_some(Self { backend_id, status })
    }
}

/// `0` means absent; any other code must be known.
fn optional_code<T>(code: u8, parse: fn(u8) -> Option<T>) -> Option<Option<T>> {
    if code == 0 {
        Some(None)
    } else {
        parse(code).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // TransferRequest
    // =========================================================================

    #[test]
    fn test_transfer_request_roundtrip() {
        let req = TransferRequest {
            correlation_id: Uuid::from_u128(1),
            player_id: Uuid::from_u128(2),
            target_backend_id: "lobby".into(),
            referral_data: b"t1.abc.def".to_vec(),
        };
        assert_eq!(TransferRequest::decode(&req.encode().unwrap()), Some(req));
    }

    #[test]
    fn test_transfer_request_blank_target_fails_both_ways() {
        let req = TransferRequest {
            correlation_id: Uuid::nil(),
            player_id: Uuid::nil(),
            target_backend_id: " ".into(),
            referral_data: Vec::new(),
        };
        assert!(req.encode().is_err());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(Uuid::nil().as_bytes());
        bytes.extend_from_slice(Uuid::nil().as_bytes());
        put_sized_bytes(&mut bytes, b" ");
        put_sized_bytes(&mut bytes, b"");
        assert!(TransferRequest::decode(&bytes).is_none());
    }

    #[test]
    fn test_transfer_request_trailing_byte_returns_none() {
        let req = TransferRequest {
            correlation_id: Uuid::from_u128(1),
            player_id: Uuid::from_u128(2),
            target_backend_id: "lobby".into(),
            referral_data: Vec::new(),
        };
        let mut bytes = req.encode().unwrap();
        bytes.push(0);
        assert!(TransferRequest::decode(&bytes).is_none());
    }

    // =========================================================================
    // TransferResult
    // =========================================================================

    #[test]
    fn test_transfer_result_ok_and_failed_roundtrip() {
        let ok = TransferResult::ok(Uuid::from_u128(5));
        assert_eq!(TransferResult::decode(&ok.encode()), Some(ok));

        let failed = TransferResult::failed(Uuid::from_u128(5), TransferFailureReason::InternalError);
        assert_eq!(TransferResult::decode(&failed.encode()), Some(failed));
    }

    #[test]
    fn test_transfer_result_unknown_reason_returns_none() {
        let mut bytes = TransferResult::ok(Uuid::nil()).encode();
        bytes[17] = 200;
        assert!(TransferResult::decode(&bytes).is_none());
    }

    // =========================================================================
    // TokenValidationNotice / BackendStatusNotice
    // =========================================================================

    #[test]
    fn test_token_validation_notice_roundtrip() {
        let notice = TokenValidationNotice {
            player_id: Uuid::from_u128(3),
            backend_id: "survival".into(),
            outcome: ValidationOutcome::Rejected,
            reason: Some(TokenRejectReason::Replayed),
        };
        assert_eq!(TokenValidationNotice::decode(&notice.encode().unwrap()), Some(notice));
    }

    #[test]
    fn test_backend_status_notice_roundtrip() {
        let notice = BackendStatusNotice {
            backend_id: "survival".into(),
            status: BackendStatus::Offline,
        };
        assert_eq!(BackendStatusNotice::decode(&notice.encode().unwrap()), Some(notice));
    }

    #[test]
    fn test_token_reject_reason_display_is_stable() {
        assert_eq!(TokenRejectReason::InvalidSignature.to_string(), "INVALID_SIGNATURE");
        assert_eq!(TokenRejectReason::from_code(7), Some(TokenRejectReason::Replayed));
        assert_eq!(TokenRejectReason::from_code(8), None);
    }
}
