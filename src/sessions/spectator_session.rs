use std::net::SocketAddr;
use std::sync::Arc;

use bytemuck::Zeroable;
use crossbeam_channel::{unbounded, Receiver};
use instant::Duration;
use tracing::debug;

use crate::config::SessionConfig;
use crate::frame::Frame;
use crate::frame_info::ConfirmedInputs;
use crate::network::background::BackgroundJobManager;
use crate::network::messages::Message;
use crate::network::protocol::connection::{Event, PeerConnection};
use crate::network::socket::NonBlockingSocket;
use crate::network::stats::NetworkStats;
use crate::{
    Config, PeerEvent, PlayerHandle, PlayerKind, RollnetError, SessionHandler, SessionState,
    MAX_PLAYERS,
};

/// The number of confirmed frames a spectator can buffer, a second's worth of inputs.
pub(crate) const SPECTATOR_BUFFER_SIZE: usize = 60;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// One slot of the spectator's input ring: the inputs of all players for one frame,
/// assembled from the per-player events the upstream connection publishes.
#[derive(Debug, Copy, Clone)]
struct FrameSlot<I> {
    frame: Frame,
    inputs: [I; MAX_PLAYERS],
    filled: usize,
}

/// A `SpectatorSession` follows a single upstream host that broadcasts the confirmed
/// inputs of all players. The host calls map to the remote backend's: `begin_frame`,
/// `synchronize_inputs`, advance the simulation, `advance_frame`. There is never a
/// rollback; everything a spectator sees is already confirmed.
pub struct SpectatorSession<T>
where
    T: Config,
{
    state: SessionState,
    num_players: usize,
    host: PeerConnection<T>,
    jobs: BackgroundJobManager,
    inbound_rx: Receiver<(SocketAddr, Message)>,

    inputs: Vec<FrameSlot<T::Input>>,
    current_frame: Frame,
    last_recv_frame: Frame,
    max_frames_behind: usize,
    catchup_speed: usize,
}

impl<T: Config> SpectatorSession<T> {
    /// Creates the session and immediately starts synchronizing with the host.
    pub fn new(
        config: SessionConfig,
        host_addr: SocketAddr,
        socket: impl NonBlockingSocket + 'static,
    ) -> Self {
        config.assert_valid();
        let socket: Arc<dyn NonBlockingSocket> = Arc::new(socket);
        let (inbound_tx, inbound_rx) = unbounded();

        let mut jobs = BackgroundJobManager::new();
        jobs.spawn_receive_pump(socket.clone(), inbound_tx);

        // the host feeds every player queue through this one connection
        let mut host = PeerConnection::new(
            host_addr,
            (0..config.num_players).collect(),
            0,
            std::mem::size_of::<T::Input>(),
            socket,
            &config,
        );
        host.synchronize();
        debug!(host = %host_addr, "spectating");

        Self {
            state: SessionState::Synchronizing,
            num_players: config.num_players,
            host,
            jobs,
            inbound_rx,
            inputs: vec![
                FrameSlot {
                    frame: Frame::NULL,
                    inputs: [T::Input::zeroed(); MAX_PLAYERS],
                    filled: 0,
                };
                SPECTATOR_BUFFER_SIZE
            ],
            current_frame: Frame::NULL,
            last_recv_frame: Frame::NULL,
            max_frames_behind: config.max_frames_behind,
            catchup_speed: config.catchup_speed,
        }
    }

    /// Drains the network, drives the upstream connection and forwards peer events.
    pub fn begin_frame(&mut self, handler: &mut dyn SessionHandler<T>) -> Result<(), RollnetError> {
        self.jobs.throw_if_error()?;

        while let Ok((from, msg)) = self.inbound_rx.try_recv() {
            if self.host.is_handling_message(&from) {
                self.host.handle_message(&msg);
            }
        }

        let connect_status: Vec<_> = (0..self.num_players)
            .map(|queue| self.host.peer_connect_status(queue))
            .collect();
        let events: Vec<_> = self.host.update(&connect_status).collect();
        for event in events {
            self.handle_event(event, handler);
        }
        Ok(())
    }

    /// The confirmed inputs for the next frame. `PredictionThreshold` while the host's
    /// broadcast has not caught up with us yet.
    pub fn synchronize_inputs(&mut self) -> Result<ConfirmedInputs<T::Input>, RollnetError> {
        if self.state != SessionState::Running {
            return Err(RollnetError::NotSynchronized);
        }

        let frame_to_grab = self.current_frame.next();
        let slot = &self.inputs[frame_to_grab.offset(SPECTATOR_BUFFER_SIZE)];

        // the input has not arrived yet, wait for the host
        if slot.frame < frame_to_grab || slot.filled < self.num_players {
            return Err(RollnetError::PredictionThreshold);
        }
        // the host already overwrote this slot; the stream is gone for good
        if slot.frame > frame_to_grab {
            return Err(RollnetError::SpectatorTooFarBehind);
        }

        Ok(ConfirmedInputs::new(
            frame_to_grab,
            &slot.inputs[..self.num_players],
        ))
    }

    /// Finishes the tick after the host application advanced its simulation.
    pub fn advance_frame(&mut self) -> Result<(), RollnetError> {
        if self.state != SessionState::Running {
            return Err(RollnetError::NotSynchronized);
        }
        self.current_frame = self.current_frame.next();
        Ok(())
    }

    pub const fn current_state(&self) -> SessionState {
        self.state
    }

    /// How many confirmed frames the host is ahead of this spectator.
    pub fn frames_behind_host(&self) -> usize {
        if self.last_recv_frame <= self.current_frame {
            return 0;
        }
        (self.last_recv_frame - self.current_frame).count() as usize
    }

    /// How many frames to advance this tick: 1 normally, `catchup_speed` when the host ran
    /// too far ahead.
    pub fn frames_to_advance(&self) -> usize {
        if self.frames_behind_host() > self.max_frames_behind {
            self.catchup_speed
        } else {
            1
        }
    }

    pub fn network_stats(&self) -> Result<NetworkStats, RollnetError> {
        self.host.network_stats().ok_or(RollnetError::NotSynchronized)
    }

    /// Stops following the host and shuts the background worker down.
    pub fn close(&mut self, handler: &mut dyn SessionHandler<T>) {
        handler.on_session_close();
        self.host.disconnect();
        self.jobs.stop(SHUTDOWN_GRACE);
        self.state = SessionState::Initializing;
    }

    fn handle_event(&mut self, event: Event<T>, handler: &mut dyn SessionHandler<T>) {
        let host_handle = PlayerHandle {
            kind: PlayerKind::Remote,
            number: 0,
            queue: 0,
        };
        match event {
            Event::Connected => handler.on_peer_event(host_handle, PeerEvent::Connected),
            Event::Synchronizing { total, count } => {
                handler.on_peer_event(host_handle, PeerEvent::Synchronizing { total, count });
            }
            Event::Synchronized { ping } => {
                handler.on_peer_event(host_handle, PeerEvent::Synchronized { ping });
                self.state = SessionState::Running;
                handler.on_session_start();
            }
            Event::NetworkInterrupted { disconnect_timeout } => {
                handler.on_peer_event(
                    host_handle,
                    PeerEvent::NetworkInterrupted { disconnect_timeout },
                );
            }
            Event::NetworkResumed => handler.on_peer_event(host_handle, PeerEvent::NetworkResumed),
            Event::SyncFailure => {
                handler.on_peer_event(host_handle, PeerEvent::SynchronizationFailure);
            }
            Event::Disconnected => {
                handler.on_peer_event(host_handle, PeerEvent::Disconnected);
            }
            Event::Input { player, input } => {
                let slot = &mut self.inputs[input.frame.offset(SPECTATOR_BUFFER_SIZE)];
                if slot.frame != input.frame {
                    slot.frame = input.frame;
                    slot.filled = 0;
                }
                slot.inputs[player] = input.input;
                slot.filled += 1;

                if slot.filled == self.num_players {
                    assert!(input.frame > self.last_recv_frame);
                    self.last_recv_frame = input.frame;
                    // keep the advantage estimate current so quality reports make sense
                    self.host.update_local_frame_advantage(input.frame);
                }
            }
        }
    }
}
