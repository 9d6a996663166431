mod stubs;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use serial_test::serial;

use rollnet::{
    Frame, P2PSession, PlayerType, RollnetError, SessionConfig, SessionState, SpectatorSession,
    UdpNonBlockingSocket,
};
use stubs::{GameStub, StubConfig, StubInput};

fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
}

fn test_config() -> SessionConfig {
    SessionConfig {
        frame_delay: 0,
        ..SessionConfig::with_players(2)
    }
}

#[test]
#[serial]
fn test_spectators_cannot_join_after_start() {
    let socket_a = UdpNonBlockingSocket::bind_to_port(7811).unwrap();
    let mut sess_a = P2PSession::<StubConfig>::new(test_config(), socket_a);
    let local_a = sess_a.add_player(PlayerType::Local, 0).unwrap();
    sess_a.add_player(PlayerType::Remote(addr(7812)), 1).unwrap();
    sess_a.start_session().unwrap();

    let socket_b = UdpNonBlockingSocket::bind_to_port(7812).unwrap();
    let mut sess_b = P2PSession::<StubConfig>::new(test_config(), socket_b);
    sess_b.add_player(PlayerType::Remote(addr(7811)), 0).unwrap();
    let local_b = sess_b.add_player(PlayerType::Local, 1).unwrap();
    sess_b.start_session().unwrap();

    let mut game_a = GameStub::new();
    let mut game_b = GameStub::new();
    for _ in 0..1000 {
        sess_a.begin_frame(&mut game_a).unwrap();
        sess_b.begin_frame(&mut game_b).unwrap();
        if sess_a.current_state() == SessionState::Running
            && sess_b.current_state() == SessionState::Running
        {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(sess_a.current_state(), SessionState::Running);

    // spectators may join while synchronizing, but not anymore once running
    assert_eq!(
        sess_a.add_player(PlayerType::Spectator(addr(7819)), 9),
        Err(RollnetError::AlreadySynchronized)
    );

    let _ = (local_a, local_b);
}

#[test]
#[serial]
fn test_spectator_receives_confirmed_inputs_in_order() {
    let spectator_addr = addr(7823);

    let socket_a = UdpNonBlockingSocket::bind_to_port(7821).unwrap();
    let mut sess_a = P2PSession::<StubConfig>::new(test_config(), socket_a);
    let local_a = sess_a.add_player(PlayerType::Local, 0).unwrap();
    sess_a.add_player(PlayerType::Remote(addr(7822)), 1).unwrap();
    sess_a
        .add_player(PlayerType::Spectator(spectator_addr), 2)
        .unwrap();
    sess_a.start_session().unwrap();

    let socket_b = UdpNonBlockingSocket::bind_to_port(7822).unwrap();
    let mut sess_b = P2PSession::<StubConfig>::new(test_config(), socket_b);
    sess_b.add_player(PlayerType::Remote(addr(7821)), 0).unwrap();
    let local_b = sess_b.add_player(PlayerType::Local, 1).unwrap();
    sess_b.start_session().unwrap();

    let spectator_socket = UdpNonBlockingSocket::bind_to_port(7823).unwrap();
    let mut spectator =
        SpectatorSession::<StubConfig>::new(test_config(), addr(7821), spectator_socket);

    let mut game_a = GameStub::new();
    let mut game_b = GameStub::new();
    let mut game_s = GameStub::new();

    let mut received = Vec::new();

    for _ in 0..2000 {
        sess_a.begin_frame(&mut game_a).unwrap();
        sess_b.begin_frame(&mut game_b).unwrap();
        spectator.begin_frame(&mut game_s).unwrap();

        let both_running = sess_a.current_state() == SessionState::Running
            && sess_b.current_state() == SessionState::Running;
        if both_running {
            // each peer derives its input from its own frame, so frame f always carries
            // the pair (2f, 2f + 1) no matter how the peers interleave
            if sess_a.current_frame() < Frame::new(60) {
                let input = StubInput {
                    inp: sess_a.current_frame().number() as u32 * 2,
                };
                if sess_a.add_local_input(local_a, input).is_ok() {
                    let inputs = sess_a.synchronize_inputs().unwrap();
                    game_a.advance(&inputs);
                    sess_a.advance_frame(&mut game_a).unwrap();
                }
            }
            if sess_b.current_frame() < Frame::new(60) {
                let input = StubInput {
                    inp: sess_b.current_frame().number() as u32 * 2 + 1,
                };
                if sess_b.add_local_input(local_b, input).is_ok() {
                    let inputs = sess_b.synchronize_inputs().unwrap();
                    game_b.advance(&inputs);
                    sess_b.advance_frame(&mut game_b).unwrap();
                }
            }
        }

        if spectator.current_state() == SessionState::Running {
            for _ in 0..spectator.frames_to_advance() {
                match spectator.synchronize_inputs() {
                    Ok(confirmed) => {
                        received.push(confirmed);
                        spectator.advance_frame().unwrap();
                    }
                    Err(RollnetError::PredictionThreshold) => break,
                    Err(err) => panic!("unexpected spectator error: {}", err),
                }
            }
        }

        if received.len() >= 30 {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }

    // every confirmed frame arrives exactly once, in order, starting at frame 0
    assert!(received.len() >= 30, "spectator got {} frames", received.len());
    for (i, confirmed) in received.iter().enumerate() {
        assert_eq!(confirmed.frame, Frame::new(i as i32));
        assert_eq!(confirmed.count(), 2);
        // both peers fed deterministic inputs; frame f carries exactly them
        assert_eq!(confirmed.inputs()[0].inp, i as u32 * 2);
        assert_eq!(confirmed.inputs()[1].inp, i as u32 * 2 + 1);
    }
    assert_eq!(game_s.session_starts, 1);
}
