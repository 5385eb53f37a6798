//! Concurrent transitions on a shared session.

use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicUsize, Ordering};

use handoff_session::{PlayerSession, SessionRegistry, SessionState};

#[test]
fn test_racing_same_transition_exactly_one_wins() {
    for _ in 0..50 {
        let session = Arc::new(PlayerSession::with_state(SessionState::Playing));
        let winners = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    if session.transition_to(SessionState::Transferring).unwrap() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Transferring);
    }
}

#[test]
fn test_racing_conflicting_transitions_leave_a_valid_state() {
    for _ in 0..50 {
        let session = Arc::new(PlayerSession::with_state(SessionState::Handshaking));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let _ = session.transition_to(SessionState::Playing);
            });
            scope.spawn(|| {
                let _ = session.transition_to(SessionState::Disconnected);
            });
        });

        let state = session.state();
        assert!(
            matches!(state, SessionState::Playing | SessionState::Disconnected),
            "unexpected {state}"
        );
    }
}

#[test]
fn test_registry_concurrent_create_and_remove() {
    let registry = Arc::new(SessionRegistry::new());

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                for _ in 0..100 {
                    let session = registry.create();
                    assert!(registry.remove(session.id()).is_some());
                }
            });
        }
    });

    assert!(registry.is_empty());
}

#[test]
fn test_registry_concurrent_binds_leave_one_live_session_per_player() {
    let registry = Arc::new(SessionRegistry::new());
    let player = uuid::Uuid::new_v4();
    let start = Arc::new(Barrier::new(8));

    let sessions: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let start = Arc::clone(&start);
                scope.spawn(move || {
                    let session = registry.create();
                    start.wait();
                    registry.bind_player(&session, player);
                    session
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(registry.len(), 1);
    let live: Vec<_> = sessions
        .iter()
        .filter(|s| s.state() != SessionState::Disconnected)
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(registry.find_by_player(player).unwrap().id(), live[0].id());
}
