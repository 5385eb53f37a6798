//! Proxy and backend nodes wired together in-process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use handoff::control::{CONTROL_CHANNEL, ConnectionRedirect, RedirectError};
use handoff::event::{EventBus, EventPriority};
use handoff::guard::{ManualClock, RateLimitConfig};
use handoff::route::{BackendInfo, RoutePostSelect, RoutePreSelect, RoutingError, SelectionReason};
use handoff::session::{PlayerDisconnected, SessionState};
use handoff::token::{StaticSecrets, TokenRejectReason, TransferTokenIssuer};
use handoff::transport::{ChannelLink, Link, LoopbackMessaging};
use handoff::wire::{ConnectFrame, HostAddress, ProtocolLimits};
use handoff::{BackendNode, BackendNodeConfig, HandoffError, HandshakeVerdict, Proxy, ProxyConfig, ReferralConfig};
use uuid::Uuid;

const SECRET: &str = "integration-secret-0123456789abcdef";
const NOW: i64 = 1_700_000_000_000;

// -- Helpers --

#[derive(Default)]
struct FakeServer {
    connected: Mutex<HashSet<Uuid>>,
    redirects: Mutex<Vec<(Uuid, HostAddress, Vec<u8>)>>,
}

impl ConnectionRedirect for FakeServer {
    fn is_connected(&self, player_id: Uuid) -> bool {
        self.connected.lock().unwrap().contains(&player_id)
    }

    fn redirect(&self, player_id: Uuid, proxy: &HostAddress, referral_data: &[u8]) -> Result<(), RedirectError> {
        self.redirects
            .lock()
            .unwrap()
            .push((player_id, proxy.clone(), referral_data.to_vec()));
        Ok(())
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    proxy: Proxy,
    proxy_side: Arc<LoopbackMessaging>,
    lobby: BackendNode,
    lobby_server: Arc<FakeServer>,
}

fn proxy_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.proxy_id = "proxy".into();
    config.referral = ReferralConfig {
        host: "play.example.net".into(),
        port: 25565,
    };
    config.security.proxy_secret = SECRET.into();
    config.backends = vec![
        BackendInfo::new("lobby", "10.0.0.2", 25566),
        BackendInfo::new("arena", "10.0.0.3", 25566),
    ];
    config
}

fn backend_config(server_id: &str) -> BackendNodeConfig {
    BackendNodeConfig {
        server_id: server_id.into(),
        proxy_secret: SECRET.into(),
        require_certificates: false,
        proxy_connect_host: "play.example.net".into(),
        ..BackendNodeConfig::default()
    }
}

fn harness_with(config: ProxyConfig, lobby: BackendNodeConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(NOW));
    let (proxy_side, lobby_side) = LoopbackMessaging::pair();
    let proxy = Proxy::builder(config)
        .messaging(proxy_side.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    let lobby_server = Arc::new(FakeServer::default());
    let lobby = BackendNode::start(lobby, lobby_side, lobby_server.clone(), clock.clone()).unwrap();
    Harness {
        clock,
        proxy,
        proxy_side,
        lobby,
        lobby_server,
    }
}

fn harness() -> Harness {
    harness_with(proxy_config(), backend_config("lobby"))
}

fn client_frame(player_id: Uuid, referral: Option<&[u8]>) -> Vec<u8> {
    ConnectFrame {
        protocol_crc: 0xC0FFEE,
        protocol_build: 7,
        client_version: "1.4.2".into(),
        client_type: 0,
        language: "en_US".into(),
        identity_token: Some("identity".into()),
        player_id: Some(player_id),
        username: Some("alice".into()),
        referral_data: referral.map(<[u8]>::to_vec),
        referral_source: None,
    }
    .encode(&ProtocolLimits::default())
    .unwrap()
}

/// Sessions hold links weakly and nothing here sends, so the link may
/// die as soon as the call returns.
fn link() -> Arc<dyn Link> {
    let (link, _rx) = ChannelLink::new(8);
    link
}

fn forwarded(bytes: &[u8]) -> ConnectFrame {
    ConnectFrame::decode(bytes, &ProtocolLimits::default()).unwrap()
}

/// Connects `player` and has the lobby confirm the token.
fn connect_to_lobby(h: &Harness, player: Uuid) -> Arc<handoff::session::PlayerSession> {
    let accepted = h
        .proxy
        .accept_connection(&client_frame(player, None), &link(), Some("203.0.113.9:50000".parse().unwrap()), None)
        .unwrap();
    let verdict = h.lobby.handle_handshake(&forwarded(&accepted.forwarded_frame)).unwrap();
    assert!(matches!(verdict, HandshakeVerdict::Verified(_)));
    accepted.session
}

// =========================================================================
// Initial connection
// =========================================================================

#[test]
fn test_accept_connection_routes_to_default_and_stamps_token() {
    let h = harness();
    let player = Uuid::new_v4();

    let accepted = h
        .proxy
        .accept_connection(&client_frame(player, None), &link(), None, None)
        .unwrap();

    assert_eq!(accepted.backend.id, "lobby");
    assert_eq!(accepted.reason, SelectionReason::Default);
    assert_eq!(accepted.session.state(), SessionState::Handshaking);
    assert_eq!(accepted.session.selected_backend_id().as_deref(), Some("lobby"));
    assert_eq!(accepted.session.username().as_deref(), Some("alice"));

    let frame = forwarded(&accepted.forwarded_frame);
    assert_eq!(frame.player_id, Some(player));
    assert_eq!(frame.referral_source, Some(HostAddress::new("play.example.net", 25565)));
    let token = String::from_utf8(frame.referral_data.unwrap()).unwrap();
    assert!(token.starts_with("v1."));
}

#[test]
fn test_backend_accepting_token_moves_session_to_playing() {
    let h = harness();
    let player = Uuid::new_v4();
    let session = connect_to_lobby(&h, player);

    assert_eq!(session.state(), SessionState::Playing);
    assert_eq!(h.proxy.sessions().find_by_player(player).unwrap().id(), session.id());
}

#[test]
fn test_backend_second_use_of_token_is_replayed() {
    let h = harness();
    let player = Uuid::new_v4();
    let accepted = h
        .proxy
        .accept_connection(&client_frame(player, None), &link(), None, None)
        .unwrap();
    let frame = forwarded(&accepted.forwarded_frame);

    assert!(h.lobby.handle_handshake(&frame).is_ok());
    match h.lobby.handle_handshake(&frame) {
        Err(HandoffError::TokenRejected(e)) => assert_eq!(e.reason, TokenRejectReason::Replayed),
        other => panic!("expected replay rejection, got {other:?}"),
    }
    // The rejection notice doesn't undo the earlier acceptance.
    assert_eq!(accepted.session.state(), SessionState::Playing);
}

#[test]
fn test_backend_frame_for_other_player_does_not_consume_token() {
    let h = harness();
    let player = Uuid::new_v4();
    let accepted = h
        .proxy
        .accept_connection(&client_frame(player, None), &link(), None, None)
        .unwrap();
    let frame = forwarded(&accepted.forwarded_frame);
    let spoofed = ConnectFrame {
        player_id: Some(Uuid::new_v4()),
        ..frame.clone()
    };

    match h.lobby.handle_handshake(&spoofed) {
        Err(HandoffError::TokenRejected(e)) => assert_eq!(e.reason, TokenRejectReason::TargetMismatch),
        other => panic!("expected target mismatch, got {other:?}"),
    }
    assert!(matches!(
        h.lobby.handle_handshake(&frame).unwrap(),
        HandshakeVerdict::Verified(_)
    ));
    assert_eq!(accepted.session.state(), SessionState::Playing);
}

#[test]
fn test_backend_expired_token_is_rejected() {
    let h = harness();
    let accepted = h
        .proxy
        .accept_connection(&client_frame(Uuid::new_v4(), None), &link(), None, None)
        .unwrap();
    h.clock.advance(10_001);

    match h.lobby.handle_handshake(&forwarded(&accepted.forwarded_frame)) {
        Err(HandoffError::TokenRejected(e)) => assert_eq!(e.reason, TokenRejectReason::Expired),
        other => panic!("expected expiry rejection, got {other:?}"),
    }
    assert_eq!(accepted.session.state(), SessionState::Handshaking);
}

#[test]
fn test_backend_permissive_mode_admits_unverified_client() {
    let h = harness_with(
        proxy_config(),
        BackendNodeConfig {
            enforce_proxy: false,
            ..backend_config("lobby")
        },
    );
    let frame = forwarded(&client_frame(Uuid::new_v4(), None));

    match h.lobby.handle_handshake(&frame).unwrap() {
        HandshakeVerdict::Unverified(e) => assert_eq!(e.reason, TokenRejectReason::Malformed),
        other => panic!("expected unverified, got {other:?}"),
    }
    assert!(!h.lobby.is_enforcing());
}

#[test]
fn test_accept_connection_garbage_is_malformed_connect() {
    let h = harness();
    let result = h.proxy.accept_connection(b"\x00\x01", &link(), None, None);
    assert!(matches!(result, Err(HandoffError::MalformedConnect(_))));
    assert!(h.proxy.sessions().is_empty());
}

#[test]
fn test_accept_connection_over_rate_limit_is_refused() {
    let mut config = proxy_config();
    config.connect_rate = RateLimitConfig {
        window_millis: 10_000,
        max_events: 1,
    };
    let h = harness_with(config, backend_config("lobby"));
    let address = "198.51.100.4:40000".parse().unwrap();

    assert!(h
        .proxy
        .accept_connection(&client_frame(Uuid::new_v4(), None), &link(), Some(address), None)
        .is_ok());
    let second = h
        .proxy
        .accept_connection(&client_frame(Uuid::new_v4(), None), &link(), Some(address), None);
    assert!(matches!(second, Err(HandoffError::RateLimited(ip)) if ip == address.ip()));
}

#[test]
fn test_accept_connection_denied_route_disconnects_session() {
    let h = harness();
    let bus: &Arc<EventBus> = h.proxy.event_bus();
    let _ = bus.register_with::<RoutePreSelect, _>(EventPriority::Normal.into(), |event| {
        event.decision.deny("maintenance")?;
        Ok(())
    });
    let disconnected = Arc::new(Mutex::new(Vec::new()));
    {
        let disconnected = Arc::clone(&disconnected);
        let _ = bus.register::<PlayerDisconnected, _>(EventPriority::Monitor, move |event| {
            disconnected.lock().unwrap().push(event.session.state());
        });
    }

    let result = h
        .proxy
        .accept_connection(&client_frame(Uuid::new_v4(), None), &link(), None, None);

    assert!(matches!(result, Err(HandoffError::Routing(RoutingError::Denied(ref r))) if r == "maintenance"));
    assert!(h.proxy.sessions().is_empty());
    assert_eq!(*disconnected.lock().unwrap(), vec![SessionState::Disconnected]);
}

#[test]
fn test_reconnect_replaces_previous_session() {
    let h = harness();
    let player = Uuid::new_v4();
    let first = connect_to_lobby(&h, player);
    let second = connect_to_lobby(&h, player);

    assert_eq!(first.state(), SessionState::Disconnected);
    assert_eq!(second.state(), SessionState::Playing);
    assert_eq!(h.proxy.sessions().len(), 1);
}

#[test]
fn test_concurrent_connects_for_one_player_leave_one_live_session() {
    let h = harness();
    let player = Uuid::new_v4();
    let frame = client_frame(player, None);

    let sessions: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    h.proxy
                        .accept_connection(&frame, &link(), None, None)
                        .ok()
                        .map(|accepted| accepted.session)
                })
            })
            .collect();
        workers.into_iter().filter_map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(h.proxy.sessions().len(), 1);
    let live: Vec<_> = sessions
        .iter()
        .filter(|s| s.state() != SessionState::Disconnected)
        .collect();
    assert_eq!(live.len(), 1);
    assert_eq!(h.proxy.sessions().find_by_player(player).unwrap().id(), live[0].id());
}

// =========================================================================
// Transfers
// =========================================================================

#[test]
fn test_transfer_round_trip_lands_player_on_target() {
    let h = harness();
    let player = Uuid::new_v4();
    let old = connect_to_lobby(&h, player);
    h.lobby_server.connected.lock().unwrap().insert(player);

    h.proxy.transfers().request_transfer(&old, "arena").unwrap();

    assert_eq!(old.state(), SessionState::Transferring);
    assert_eq!(h.proxy.control().pending_transfers(), 0);
    let (redirected, proxy_address, referral) = h.lobby_server.redirects.lock().unwrap()[0].clone();
    assert_eq!(redirected, player);
    assert_eq!(proxy_address, HostAddress::new("play.example.net", 25565));
    assert!(referral.starts_with(b"t1."));

    // The player comes back carrying the transfer token.
    let accepted = h
        .proxy
        .accept_connection(&client_frame(player, Some(referral.as_slice())), &link(), None, None)
        .unwrap();
    assert_eq!(accepted.backend.id, "arena");
    assert_eq!(accepted.reason, SelectionReason::Transfer);
    assert_eq!(old.state(), SessionState::Disconnected);

    // The arena validates and reports back through its own endpoint.
    let arena_side = LoopbackMessaging::new();
    let arena = BackendNode::start(
        backend_config("arena"),
        arena_side.clone(),
        Arc::new(FakeServer::default()),
        h.clock.clone(),
    )
    .unwrap();
    assert!(matches!(
        arena.handle_handshake(&forwarded(&accepted.forwarded_frame)).unwrap(),
        HandshakeVerdict::Verified(_)
    ));
    for (channel, packet) in arena_side.take_sent() {
        assert_eq!(channel, CONTROL_CHANNEL);
        h.proxy_side.deliver(&channel, &packet);
    }

    assert_eq!(accepted.session.state(), SessionState::Playing);
    assert_eq!(accepted.session.selected_backend_id().as_deref(), Some("arena"));
    assert!(h.proxy.control().reject_snapshot().is_empty());
}

#[test]
fn test_transfer_for_player_unknown_to_backend_restores_playing() {
    let h = harness();
    let player = Uuid::new_v4();
    let session = connect_to_lobby(&h, player);

    h.proxy.transfers().request_transfer(&session, "arena").unwrap();

    assert_eq!(session.state(), SessionState::Playing);
    assert!(h.lobby_server.redirects.lock().unwrap().is_empty());
}

#[test]
fn test_transfer_to_current_backend_is_refused() {
    let h = harness();
    let session = connect_to_lobby(&h, Uuid::new_v4());

    let result = h.proxy.transfers().request_transfer(&session, "lobby");

    assert!(matches!(result, Err(HandoffError::AlreadyOnBackend(ref id)) if id == "lobby"));
    assert_eq!(session.state(), SessionState::Playing);
}

#[test]
fn test_forged_transfer_token_refuses_connection() {
    let h = harness();
    let result = h
        .proxy
        .accept_connection(&client_frame(Uuid::new_v4(), Some(b"t1.Zm9v.YmFy".as_slice())), &link(), None, None);

    assert!(matches!(result, Err(HandoffError::TokenRejected(_))));
    assert!(h.proxy.sessions().is_empty());
}

#[test]
fn test_transfer_token_for_another_player_refuses_connection() {
    let h = harness();
    let issuer = TransferTokenIssuer::new(Arc::new(StaticSecrets::new(SECRET)), h.clock.clone());
    let token = issuer.issue_referral_data(Uuid::new_v4(), "arena").unwrap();

    let result = h
        .proxy
        .accept_connection(&client_frame(Uuid::new_v4(), Some(token.as_slice())), &link(), None, None);

    match result {
        Err(HandoffError::TokenRejected(e)) => assert_eq!(e.reason, TokenRejectReason::TargetMismatch),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_transfer_to_unreachable_backend_falls_back_to_default() {
    let h = harness();
    let player = Uuid::new_v4();
    let issuer = TransferTokenIssuer::new(Arc::new(StaticSecrets::new(SECRET)), h.clock.clone());
    let token = issuer.issue_referral_data(player, "arena").unwrap();
    h.proxy.report_backend_unreachable("arena");
    let posted = Arc::new(Mutex::new(Vec::new()));
    {
        let posted = Arc::clone(&posted);
        let _ = h
            .proxy
            .event_bus()
            .register::<RoutePostSelect, _>(EventPriority::Monitor, move |event| {
                posted.lock().unwrap().push((event.backend_id.clone(), event.reason));
            });
    }

    let accepted = h
        .proxy
        .accept_connection(&client_frame(player, Some(token.as_slice())), &link(), None, None)
        .unwrap();

    assert_eq!(accepted.backend.id, "lobby");
    assert_eq!(accepted.reason, SelectionReason::Default);
    // Reported once, for the backend actually used.
    assert_eq!(*posted.lock().unwrap(), vec![("lobby".to_string(), SelectionReason::Default)]);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[test]
fn test_disconnect_twice_is_harmless() {
    let h = harness();
    let session = connect_to_lobby(&h, Uuid::new_v4());

    assert!(h.proxy.disconnect(session.id(), Some("quit")).is_some());
    assert!(h.proxy.disconnect(session.id(), Some("quit")).is_none());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_attach_backend_unknown_session_is_not_found() {
    let h = harness();
    let session = connect_to_lobby(&h, Uuid::new_v4());
    h.proxy.disconnect(session.id(), None);

    let result = h.proxy.attach_backend(session.id(), &link());
    assert!(matches!(result, Err(HandoffError::Session(_))));
}

#[tokio::test(start_paused = true)]
async fn test_backend_shutdown_marks_backend_offline_at_proxy() {
    let h = harness();
    h.lobby.start_heartbeat();
    tokio::task::yield_now().await;

    h.lobby.shutdown().await;

    assert_eq!(
        h.proxy.availability().status("lobby"),
        handoff::control::Availability::Offline
    );
}

#[test]
fn test_builder_without_messaging_is_config_error() {
    let result = Proxy::builder(proxy_config()).build();
    assert!(matches!(result, Err(HandoffError::Config(_))));
}
