//! What routing knows about the connection being routed.

use std::net::SocketAddr;

use handoff_wire::ConnectFrame;
use uuid::Uuid;

/// Read-only input to one routing decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingContext {
    pub player_id: Option<Uuid>,
    pub username: Option<String>,
    pub client_address: Option<SocketAddr>,
    /// Set for transfers: the backend the player asked to move to.
    pub requested_backend_id: Option<String>,
    pub protocol_crc: u32,
    pub protocol_build: u32,
    pub client_version: String,
    pub client_type: u8,
    pub language: String,
    pub identity_token_present: bool,
}

impl RoutingContext {
    /// Context for a fresh connection.
    pub fn from_connect(frame: &ConnectFrame, client_address: Option<SocketAddr>) -> Self {
        Self {
            player_id: frame.player_id,
            username: frame.username.clone(),
            client_address,
            requested_backend_id: None,
            protocol_crc: frame.protocol_crc,
            protocol_build: frame.protocol_build,
            client_version: frame.client_version.clone(),
            client_type: frame.client_type,
            language: frame.language.clone(),
            identity_token_present: frame.identity_token.is_some(),
        }
    }

    /// Context for moving an already-connected player.
    pub fn for_transfer(player_id: Uuid, requested_backend_id: impl Into<String>) -> Self {
        Self {
            player_id: Some(player_id),
            requested_backend_id: Some(requested_backend_id.into()),
            ..Self::default()
        }
    }
}
