//! Player lifecycle notifications.

use std::net::SocketAddr;
use std::sync::Arc;

use handoff_event::Event;
use uuid::Uuid;

use crate::PlayerSession;

/// A client's connect frame was accepted and a session created. Posted
/// before a backend is chosen.
#[derive(Debug, Clone)]
pub struct PlayerConnected {
    pub session: Arc<PlayerSession>,
    pub address: Option<SocketAddr>,
}

impl Event for PlayerConnected {}

/// A backend confirmed it accepted the player's proxy token.
#[derive(Debug, Clone)]
pub struct PlayerAuthenticated {
    pub session: Arc<PlayerSession>,
    pub player_id: Uuid,
    pub backend_id: String,
}

impl Event for PlayerAuthenticated {}

/// The session is gone.
#[derive(Debug, Clone)]
pub struct PlayerDisconnected {
    pub session: Arc<PlayerSession>,
    pub reason: Option<String>,
}

impl Event for PlayerDisconnected {}
