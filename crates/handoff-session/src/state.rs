//! Session lifecycle states and the atomic cell that holds one.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    New = 0,
    Handshaking = 1,
    Playing = 2,
    Transferring = 3,
    /// Terminal.
    Disconnected = 4,
}

impl SessionState {
    pub const ALL: [SessionState; 5] = [
        Self::New,
        Self::Handshaking,
        Self::Playing,
        Self::Transferring,
        Self::Disconnected,
    ];

    /// Whether `self -> next` is in the transition table. `self -> self`
    /// is not a transition and returns `false`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (New, Handshaking | Disconnected)
                | (Handshaking, Playing | Disconnected)
                | (Playing, Transferring | Disconnected)
                | (Transferring, Handshaking | Disconnected)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Disconnected
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::New,
            1 => Self::Handshaking,
            2 => Self::Playing,
            3 => Self::Transferring,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "NEW",
            Self::Handshaking => "HANDSHAKING",
            Self::Playing => "PLAYING",
            Self::Transferring => "TRANSFERRING",
            Self::Disconnected => "DISCONNECTED",
        })
    }
}

/// A [`SessionState`] that many tasks may read and advance at once.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(initial: SessionState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub(crate) fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Ok(false)` when already in `next`, `Ok(true)` when this call made
    /// the change. Of two callers racing for the same change, exactly one
    /// sees `Ok(true)`.
    pub(crate) fn transition_to(&self, next: SessionState) -> Result<bool, SessionError> {
        let mut current = self.load();
        loop {
            if current == next {
                return Ok(false);
            }
            if !current.can_transition_to(next) {
                return Err(SessionError::IllegalTransition { from: current, to: next });
            }
            match self
                .0
                .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(true),
                Err(actual) => current = SessionState::from_u8(actual),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    // =====================================================================
    // Transition table
    // =====================================================================

    #[test]
    fn test_can_transition_to_matches_table_exactly() {
        let allowed = [
            (New, Handshaking),
            (New, Disconnected),
            (Handshaking, Playing),
            (Handshaking, Disconnected),
            (Playing, Transferring),
            (Playing, Disconnected),
            (Transferring, Handshaking),
            (Transferring, Disconnected),
        ];
        for from in SessionState::ALL {
            for to in SessionState::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_transition_to_every_disallowed_pair_fails_and_keeps_state() {
        for from in SessionState::ALL {
            for to in SessionState::ALL {
                if from == to || from.can_transition_to(to) {
                    continue;
                }
                let cell = StateCell::new(from);
                let err = cell.transition_to(to).unwrap_err();
                assert!(matches!(err, SessionError::IllegalTransition { from: f, to: t } if f == from && t == to));
                assert_eq!(cell.load(), from);
            }
        }
    }

    #[test]
    fn test_transition_to_same_state_is_no_change() {
        let cell = StateCell::new(New);
        assert!(!cell.transition_to(New).unwrap());
        assert_eq!(cell.load(), New);

        let terminal = StateCell::new(Disconnected);
        assert!(!terminal.transition_to(Disconnected).unwrap());
    }

    #[test]
    fn test_transition_to_new_to_playing_fails() {
        let cell = StateCell::new(New);
        assert!(cell.transition_to(Playing).is_err());
    }

    #[test]
    fn test_transition_to_full_lifecycle_reports_changes() {
        let cell = StateCell::new(New);
        for next in [Handshaking, Playing, Transferring, Handshaking, Playing, Disconnected] {
            assert!(cell.transition_to(next).unwrap(), "-> {next}");
        }
        assert!(cell.load().is_terminal());
    }

    #[test]
    fn test_display_uses_upper_case_names() {
        assert_eq!(Transferring.to_string(), "TRANSFERRING");
    }
}
