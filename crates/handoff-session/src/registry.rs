//! All live sessions, keyed by id.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::{PlayerSession, SessionError, SessionId, SessionState};

/// Owns every live [`PlayerSession`].
///
/// Only single-key operations are exposed. Nothing holds a map-wide
/// lock, so registry calls from many connection tasks don't contend.
/// Players are indexed separately, and a player has at most one live
/// session: [`bind_player`](Self::bind_player) displaces the old one
/// atomically.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<PlayerSession>>,
    by_player: DashMap<Uuid, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session in `NEW` and registers it.
    pub fn create(&self) -> Arc<PlayerSession> {
        let session = Arc::new(PlayerSession::new());
        self.sessions.insert(session.id(), Arc::clone(&session));
        tracing::debug!(session = %session.id(), "session created");
        session
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<PlayerSession>, SessionError> {
        self.sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SessionError::NotFound(id))
    }

    /// Makes `session` the player's live session and returns the one it
    /// displaced, already `DISCONNECTED` and unregistered.
    ///
    /// The swap happens under the player's index entry, so of two
    /// concurrent binds for one player exactly one session stays live.
    pub fn bind_player(&self, session: &Arc<PlayerSession>, player_id: Uuid) -> Option<Arc<PlayerSession>> {
        session.set_player_id(player_id);
        let previous_id = match self.by_player.entry(player_id) {
            Entry::Occupied(mut entry) => Some(entry.insert(session.id())),
            Entry::Vacant(entry) => {
                entry.insert(session.id());
                None
            }
        }
        .filter(|previous| *previous != session.id())?;

        let (_, previous) = self.sessions.remove(&previous_id)?;
        let _ = previous.transition_to(SessionState::Disconnected);
        tracing::debug!(%player_id, session = %previous_id, replaced_by = %session.id(), "session displaced");
        Some(previous)
    }

    /// The live session a player is on, if any.
    pub fn find_by_player(&self, player_id: Uuid) -> Option<Arc<PlayerSession>> {
        let id = *self.by_player.get(&player_id)?.value();
        self.sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|session| !session.state().is_terminal())
    }

    /// Moves the session to `DISCONNECTED` (if it isn't already) and
    /// drops it from the registry.
    pub fn remove(&self, id: SessionId) -> Option<Arc<PlayerSession>> {
        let (_, session) = self.sessions.remove(&id)?;
        if let Some(player_id) = session.player_id() {
            // A newer session may own the entry by now.
            self.by_player.remove_if(&player_id, |_, owner| *owner == id);
        }
        // Every state can reach DISCONNECTED, and DISCONNECTED -> DISCONNECTED is a no-op.
        let _ = session.transition_to(SessionState::Disconnected);
        tracing::debug!(session = %id, "session removed");
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_get_returns_same_session() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        let found = registry.get(session.id()).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(found.state(), SessionState::New);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        assert!(matches!(registry.get(id), Err(SessionError::NotFound(missing)) if missing == id));
    }

    #[test]
    fn test_remove_disconnects_and_forgets() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        session.transition_to(SessionState::Handshaking).unwrap();

        let removed = registry.remove(session.id()).unwrap();
        assert_eq!(removed.state(), SessionState::Disconnected);
        assert!(registry.is_empty());
        assert!(registry.remove(session.id()).is_none());
    }

    #[test]
    fn test_find_by_player_skips_other_players() {
        let registry = SessionRegistry::new();
        let player = Uuid::new_v4();
        let other = registry.create();
        registry.bind_player(&other, Uuid::new_v4());
        let mine = registry.create();
        assert!(registry.bind_player(&mine, player).is_none());

        let found = registry.find_by_player(player).unwrap();
        assert_eq!(found.id(), mine.id());
        assert!(registry.find_by_player(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_bind_player_displaces_previous_session() {
        let registry = SessionRegistry::new();
        let player = Uuid::new_v4();
        let first = registry.create();
        registry.bind_player(&first, player);
        let second = registry.create();

        let displaced = registry.bind_player(&second, player).unwrap();
        assert_eq!(displaced.id(), first.id());
        assert_eq!(first.state(), SessionState::Disconnected);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_by_player(player).unwrap().id(), second.id());
    }

    #[test]
    fn test_bind_player_twice_for_same_session_displaces_nothing() {
        let registry = SessionRegistry::new();
        let player = Uuid::new_v4();
        let session = registry.create();
        registry.bind_player(&session, player);
        assert!(registry.bind_player(&session, player).is_none());
        assert_eq!(registry.find_by_player(player).unwrap().id(), session.id());
    }

    #[test]
    fn test_remove_of_displaced_session_keeps_newer_index_entry() {
        let registry = SessionRegistry::new();
        let player = Uuid::new_v4();
        let first = registry.create();
        registry.bind_player(&first, player);
        let second = registry.create();
        registry.bind_player(&second, player);

        assert!(registry.remove(first.id()).is_none());
        assert_eq!(registry.find_by_player(player).unwrap().id(), second.id());

        registry.remove(second.id());
        assert!(registry.find_by_player(player).is_none());
    }
}
