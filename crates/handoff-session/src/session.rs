//! One client connection's session record.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use handoff_transport::Link;
use uuid::Uuid;

use crate::SessionError;
use crate::state::{SessionState, StateCell};

/// Opaque, randomly generated session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identity facts learned during the connect handshake.
#[derive(Debug, Default)]
struct Identity {
    player_id: Option<Uuid>,
    username: Option<String>,
    client_cert: Option<String>,
    selected_backend_id: Option<String>,
}

/// The proxy's record of one client connection.
///
/// Shared as `Arc<PlayerSession>` between the registry, the connection
/// task and the control plane. Every field uses interior mutability, so
/// all methods take `&self`.
pub struct PlayerSession {
    id: SessionId,
    state: StateCell,
    client: RwLock<Option<Weak<dyn Link>>>,
    backend: RwLock<Option<Weak<dyn Link>>>,
    identity: RwLock<Identity>,
}

impl PlayerSession {
    pub fn new() -> Self {
        Self::with_state(SessionState::New)
    }

    pub fn with_state(initial: SessionState) -> Self {
        Self {
            id: SessionId::new(),
            state: StateCell::new(initial),
            client: RwLock::new(None),
            backend: RwLock::new(None),
            identity: RwLock::new(Identity::default()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// Moves to `next`. Returns `Ok(false)` when already there and
    /// `Ok(true)` when this call made the change.
    ///
    /// # Errors
    /// [`SessionError::IllegalTransition`] if `next` isn't reachable from
    /// the current state. The state is left unchanged.
    pub fn transition_to(&self, next: SessionState) -> Result<bool, SessionError> {
        let result = self.state.transition_to(next);
        match &result {
            Ok(true) => tracing::debug!(session = %self.id, state = %next, "session state changed"),
            Ok(false) => {}
            Err(e) => tracing::error!(session = %self.id, error = %e, "rejected session transition"),
        }
        result
    }

    // -- Links --

    pub fn attach_client(&self, link: &Arc<dyn Link>) {
        *write(&self.client) = Some(Arc::downgrade(link));
    }

    pub fn attach_backend(&self, link: &Arc<dyn Link>) {
        *write(&self.backend) = Some(Arc::downgrade(link));
    }

    pub fn clear_backend(&self) {
        *write(&self.backend) = None;
    }

    /// The client link, if it is still alive.
    pub fn client_link(&self) -> Option<Arc<dyn Link>> {
        read(&self.client).as_ref().and_then(Weak::upgrade)
    }

    /// The backend link, if attached and still alive.
    pub fn backend_link(&self) -> Option<Arc<dyn Link>> {
        read(&self.backend).as_ref().and_then(Weak::upgrade)
    }

    pub fn send_to_client(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        let link = self.client_link().ok_or(SessionError::LinkClosed(self.id))?;
        link.send(bytes)?;
        Ok(())
    }

    pub fn send_to_backend(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        let link = self.backend_link().ok_or(SessionError::LinkClosed(self.id))?;
        link.send(bytes)?;
        Ok(())
    }

    // -- Identity --

    pub fn player_id(&self) -> Option<Uuid> {
        read(&self.identity).player_id
    }

    pub fn set_player_id(&self, player_id: Uuid) {
        write(&self.identity).player_id = Some(player_id);
    }

    pub fn username(&self) -> Option<String> {
        read(&self.identity).username.clone()
    }

    pub fn set_username(&self, username: impl Into<String>) {
        write(&self.identity).username = Some(username.into());
    }

    /// Fingerprint of the client's certificate, as presented at connect.
    pub fn client_cert(&self) -> Option<String> {
        read(&self.identity).client_cert.clone()
    }

    pub fn set_client_cert(&self, fingerprint: impl Into<String>) {
        write(&self.identity).client_cert = Some(fingerprint.into());
    }

    pub fn selected_backend_id(&self) -> Option<String> {
        read(&self.identity).selected_backend_id.clone()
    }

    pub fn set_selected_backend_id(&self, backend_id: impl Into<String>) {
        write(&self.identity).selected_backend_id = Some(backend_id.into());
    }
}

impl Default for PlayerSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("player_id", &self.player_id())
            .field("selected_backend_id", &self.selected_backend_id())
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_transport::{ChannelLink, TransportError};

    // =====================================================================
    // Links
    // =====================================================================

    #[test]
    fn test_send_to_client_reaches_attached_link() {
        let session = PlayerSession::new();
        let (link, mut rx) = ChannelLink::new(4);
        let link: Arc<dyn Link> = link;
        session.attach_client(&link);

        session.send_to_client(b"hello".to_vec()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), b"hello");
    }

    #[test]
    fn test_send_to_backend_unattached_is_link_closed() {
        let session = PlayerSession::new();
        assert!(matches!(
            session.send_to_backend(vec![1]),
            Err(SessionError::LinkClosed(id)) if id == session.id()
        ));
    }

    #[test]
    fn test_send_after_link_dropped_is_link_closed() {
        let session = PlayerSession::new();
        let (link, _rx) = ChannelLink::new(4);
        let link: Arc<dyn Link> = link;
        session.attach_backend(&link);
        assert!(session.backend_link().is_some());

        drop(link);
        assert!(session.backend_link().is_none());
        assert!(matches!(session.send_to_backend(vec![1]), Err(SessionError::LinkClosed(_))));
    }

    #[test]
    fn test_send_full_link_surfaces_transport_error() {
        let session = PlayerSession::new();
        let (link, _rx) = ChannelLink::new(1);
        let link: Arc<dyn Link> = link;
        session.attach_client(&link);
        session.send_to_client(vec![1]).unwrap();
        assert!(matches!(
            session.send_to_client(vec![2]),
            Err(SessionError::Transport(TransportError::Backpressure(_)))
        ));
    }

    #[test]
    fn test_clear_backend_detaches() {
        let session = PlayerSession::new();
        let (link, _rx) = ChannelLink::new(1);
        let link: Arc<dyn Link> = link;
        session.attach_backend(&link);
        session.clear_backend();
        assert!(session.backend_link().is_none());
    }

    // =====================================================================
    // Identity and state
    // =====================================================================

    #[test]
    fn test_identity_setters_round_trip() {
        let session = PlayerSession::new();
        let player = Uuid::new_v4();
        session.set_player_id(player);
        session.set_username("steve");
        session.set_client_cert("abc");
        session.set_selected_backend_id("lobby");

        assert_eq!(session.player_id(), Some(player));
        assert_eq!(session.username().as_deref(), Some("steve"));
        assert_eq!(session.client_cert().as_deref(), Some("abc"));
        assert_eq!(session.selected_backend_id().as_deref(), Some("lobby"));
    }

    #[test]
    fn test_transition_to_illegal_leaves_state() {
        let session = PlayerSession::new();
        assert!(session.transition_to(SessionState::Playing).is_err());
        assert_eq!(session.state(), SessionState::New);
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(PlayerSession::new().id(), PlayerSession::new().id());
    }
}
