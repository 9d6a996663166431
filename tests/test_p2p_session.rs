mod stubs;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use serial_test::serial;

use rollnet::{
    Frame, P2PSession, PeerEvent, PlayerHandle, PlayerType, RollnetError, SessionConfig,
    SessionState, UdpNonBlockingSocket,
};
use stubs::{GameStub, StubConfig, StubInput};

fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
}

fn test_config(num_players: usize) -> SessionConfig {
    SessionConfig {
        frame_delay: 0,
        ..SessionConfig::with_players(num_players)
    }
}

fn session_pair(
    config: SessionConfig,
    port_a: u16,
    port_b: u16,
) -> (
    P2PSession<StubConfig>,
    PlayerHandle,
    P2PSession<StubConfig>,
    PlayerHandle,
) {
    let socket_a = UdpNonBlockingSocket::bind_to_port(port_a).unwrap();
    let mut sess_a = P2PSession::<StubConfig>::new(config.clone(), socket_a);
    let local_a = sess_a.add_player(PlayerType::Local, 0).unwrap();
    sess_a.add_player(PlayerType::Remote(addr(port_b)), 1).unwrap();

    let socket_b = UdpNonBlockingSocket::bind_to_port(port_b).unwrap();
    let mut sess_b = P2PSession::<StubConfig>::new(config, socket_b);
    sess_b.add_player(PlayerType::Remote(addr(port_a)), 0).unwrap();
    let local_b = sess_b.add_player(PlayerType::Local, 1).unwrap();

    sess_a.start_session().unwrap();
    sess_b.start_session().unwrap();
    (sess_a, local_a, sess_b, local_b)
}

fn synchronize(
    sess_a: &mut P2PSession<StubConfig>,
    game_a: &mut GameStub,
    sess_b: &mut P2PSession<StubConfig>,
    game_b: &mut GameStub,
) {
    for _ in 0..1000 {
        sess_a.begin_frame(game_a).unwrap();
        sess_b.begin_frame(game_b).unwrap();
        if sess_a.current_state() == SessionState::Running
            && sess_b.current_state() == SessionState::Running
        {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("sessions did not synchronize in time");
}

/// One simulation tick of the host loop. Prediction-threshold stalls skip the frame, as a
/// real host would.
fn tick(
    sess: &mut P2PSession<StubConfig>,
    game: &mut GameStub,
    local: PlayerHandle,
    input: u32,
) -> bool {
    sess.begin_frame(game).unwrap();
    match sess.add_local_input(local, StubInput { inp: input }) {
        Ok(()) | Err(RollnetError::InputDropped) => {}
        Err(RollnetError::PredictionThreshold) => return false,
        Err(err) => panic!("unexpected error: {}", err),
    }
    let inputs = sess.synchronize_inputs().unwrap();
    game.advance(&inputs);
    sess.advance_frame(game).unwrap();
    true
}

#[test]
#[serial]
fn test_add_players() {
    let socket = UdpNonBlockingSocket::bind_to_port(7711).unwrap();
    let mut sess = P2PSession::<StubConfig>::new(test_config(2), socket);

    let local = sess.add_player(PlayerType::Local, 0).unwrap();
    assert_eq!(local.number(), 0);

    // only one local player per session
    assert_eq!(
        sess.add_player(PlayerType::Local, 1),
        Err(RollnetError::NotSupported)
    );
    // the slot range is fixed by the configuration
    assert_eq!(
        sess.add_player(PlayerType::Remote(addr(7712)), 5),
        Err(RollnetError::TooManyPlayers)
    );

    sess.add_player(PlayerType::Remote(addr(7712)), 1).unwrap();
    assert_eq!(
        sess.add_player(PlayerType::Remote(addr(7712)), 1),
        Err(RollnetError::DuplicatedPlayer)
    );

    // inputs are refused before the session synchronized
    assert_eq!(
        sess.add_local_input(local, StubInput { inp: 0 }),
        Err(RollnetError::NotSynchronized)
    );

    sess.start_session().unwrap();
    assert_eq!(sess.start_session(), Err(RollnetError::AlreadySynchronized));
    assert_eq!(
        sess.add_player(PlayerType::Remote(addr(7713)), 1),
        Err(RollnetError::AlreadySynchronized)
    );
}

#[test]
#[serial]
fn test_synchronize_sessions() {
    let (mut sess_a, _, mut sess_b, _) = session_pair(test_config(2), 7713, 7714);
    let mut game_a = GameStub::new();
    let mut game_b = GameStub::new();

    assert_eq!(sess_a.current_state(), SessionState::Synchronizing);
    assert_eq!(sess_b.current_state(), SessionState::Synchronizing);

    synchronize(&mut sess_a, &mut game_a, &mut sess_b, &mut game_b);

    // the host learns about the start exactly once, and about each peer exactly once
    assert_eq!(game_a.session_starts, 1);
    assert_eq!(game_b.session_starts, 1);
    assert_eq!(
        game_a.count_events(|event| matches!(event, PeerEvent::Synchronized { .. })),
        1
    );
    assert_eq!(
        game_b.count_events(|event| matches!(event, PeerEvent::Synchronized { .. })),
        1
    );
    assert!(game_a.saw_event(|event| matches!(event, PeerEvent::Connected)));
}

#[test]
#[serial]
fn test_advance_frames_deterministically() {
    let (mut sess_a, local_a, mut sess_b, local_b) = session_pair(test_config(2), 7715, 7716);
    let mut game_a = GameStub::new();
    let mut game_b = GameStub::new();
    synchronize(&mut sess_a, &mut game_a, &mut sess_b, &mut game_b);

    for i in 0..200u32 {
        tick(&mut sess_a, &mut game_a, local_a, i * 2);
        tick(&mut sess_b, &mut game_b, local_b, i * 2 + 1);
        thread::sleep(Duration::from_millis(1));
    }

    // let late inputs arrive and the last mispredictions roll back
    for _ in 0..50 {
        sess_a.begin_frame(&mut game_a).unwrap();
        sess_b.begin_frame(&mut game_b).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    // both simulations must agree on every confirmed frame
    assert!(sess_a.current_frame() > Frame::new(100));
    assert!(sess_b.current_frame() > Frame::new(100));
    for frame in [10, 50, 100] {
        let sum_a = game_a.history.get(&frame).expect("frame simulated on a");
        let sum_b = game_b.history.get(&frame).expect("frame simulated on b");
        assert_eq!(sum_a, sum_b, "divergence at frame {}", frame);
    }
}

#[test]
#[serial]
fn test_prediction_threshold_stalls_the_faster_peer() {
    let config = test_config(2);
    let prediction_frames = config.prediction_frames as i32;
    let (mut sess_a, local_a, mut sess_b, local_b) = session_pair(config, 7717, 7718);
    let mut game_a = GameStub::new();
    let mut game_b = GameStub::new();
    synchronize(&mut sess_a, &mut game_a, &mut sess_b, &mut game_b);

    // peer B goes silent, so A can only speculate a prediction window ahead
    let mut stalled = false;
    for i in 0..3 * prediction_frames as u32 {
        if !tick(&mut sess_a, &mut game_a, local_a, i) {
            stalled = true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert!(stalled);
    assert_eq!(sess_a.current_frame(), Frame::new(prediction_frames));

    // B comes back; both advance again in lockstep
    for i in 0..30u32 {
        tick(&mut sess_a, &mut game_a, local_a, 100 + i);
        tick(&mut sess_b, &mut game_b, local_b, 200 + i);
        thread::sleep(Duration::from_millis(1));
    }
    assert!(sess_a.current_frame() > Frame::new(prediction_frames));
    assert!(sess_b.current_frame() > Frame::new(prediction_frames));
}

#[test]
#[serial]
fn test_peer_disconnects_by_timeout() {
    let config = SessionConfig {
        disconnect_notify_start: Duration::from_millis(100),
        disconnect_timeout: Duration::from_millis(300),
        ..test_config(2)
    };
    let (mut sess_a, local_a, mut sess_b, local_b) = session_pair(config, 7719, 7720);
    let mut game_a = GameStub::new();
    let mut game_b = GameStub::new();
    synchronize(&mut sess_a, &mut game_a, &mut sess_b, &mut game_b);

    for i in 0..10u32 {
        tick(&mut sess_a, &mut game_a, local_a, i);
        tick(&mut sess_b, &mut game_b, local_b, i);
        thread::sleep(Duration::from_millis(1));
    }

    // B dies; A must notice, warn and then drop the peer
    drop(sess_b);
    for i in 0..300u32 {
        tick(&mut sess_a, &mut game_a, local_a, 100 + i);
        thread::sleep(Duration::from_millis(5));
        if game_a.saw_event(|event| matches!(event, PeerEvent::Disconnected)) {
            break;
        }
    }
    assert!(game_a.saw_event(|event| matches!(event, PeerEvent::NetworkInterrupted { .. })));
    assert!(game_a.saw_event(|event| matches!(event, PeerEvent::Disconnected)));

    // A keeps simulating alone, with the dead peer's inputs blanked
    let frame_after_disconnect = sess_a.current_frame();
    for i in 0..20u32 {
        tick(&mut sess_a, &mut game_a, local_a, 500 + i);
    }
    assert!(sess_a.current_frame() > frame_after_disconnect);
}

#[test]
#[serial]
fn test_disconnect_player_by_request() {
    let socket_a = UdpNonBlockingSocket::bind_to_port(7721).unwrap();
    let mut sess_a = P2PSession::<StubConfig>::new(test_config(2), socket_a);
    let local_a = sess_a.add_player(PlayerType::Local, 0).unwrap();
    let remote_b = sess_a
        .add_player(PlayerType::Remote(addr(7722)), 1)
        .unwrap();
    sess_a.start_session().unwrap();

    let socket_b = UdpNonBlockingSocket::bind_to_port(7722).unwrap();
    let mut sess_b = P2PSession::<StubConfig>::new(test_config(2), socket_b);
    sess_b
        .add_player(PlayerType::Remote(addr(7721)), 0)
        .unwrap();
    sess_b.add_player(PlayerType::Local, 1).unwrap();
    sess_b.start_session().unwrap();

    let mut game_a = GameStub::new();
    let mut game_b = GameStub::new();
    synchronize(&mut sess_a, &mut game_a, &mut sess_b, &mut game_b);

    // the local player cannot be disconnected
    assert_eq!(
        sess_a.disconnect_player(local_a, &mut game_a),
        Err(RollnetError::InvalidPlayerHandle)
    );

    sess_a.disconnect_player(remote_b, &mut game_a).unwrap();
    assert!(game_a.saw_event(|event| matches!(event, PeerEvent::Disconnected)));

    // a second disconnect of the same player is refused
    assert_eq!(
        sess_a.disconnect_player(remote_b, &mut game_a),
        Err(RollnetError::InvalidPlayerHandle)
    );
}
