use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use instant::Duration;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::frame::Frame;
use crate::frame_info::GameInput;
use crate::network::background::BackgroundJobManager;
use crate::network::messages::{ConnectionStatus, Message};
use crate::network::protocol::connection::{Event, PeerConnection};
use crate::network::protocol::input_buffer::FrameBytes;
use crate::network::socket::NonBlockingSocket;
use crate::network::stats::NetworkStats;
use crate::synchronizer::Synchronizer;
use crate::{
    Config, ConfirmedInputSink, InputStatus, PeerEvent, PlayerHandle, PlayerKind, PlayerType,
    RollnetError, SessionHandler, SessionState, MAX_SPECTATORS,
};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// One player slot of the session, indexed by the internal queue.
enum PlayerSlot<T>
where
    T: Config,
{
    Local,
    Remote(PeerConnection<T>),
}

/// Which endpoint produced a protocol event.
#[derive(Debug, Copy, Clone)]
enum EndpointId {
    Player(usize),
    Spectator(usize),
}

/// A `P2PSession` connects to remote clients in a peer-to-peer mesh and advances a shared
/// simulation in lockstep, hiding latency by predicting remote inputs and rolling back on
/// mispredictions.
///
/// Lifecycle: construct with a config and a transport, `add_player` for every participant,
/// `start_session`, then once per simulation tick call `begin_frame`, `add_local_input`
/// for the local player, `synchronize_inputs`, advance your simulation with them and
/// finish the tick with `advance_frame`.
pub struct P2PSession<T>
where
    T: Config,
{
    config: SessionConfig,
    state: SessionState,
    synchronizer: Synchronizer<T>,

    socket: Arc<dyn NonBlockingSocket>,
    jobs: BackgroundJobManager,
    inbound_rx: Receiver<(SocketAddr, Message)>,
    inbound_tx: Option<Sender<(SocketAddr, Message)>>,

    /// One slot per player queue; filled during `add_player`.
    players: Vec<Option<PlayerSlot<T>>>,
    /// Spectator endpoints with their external numbers. Slots of removed spectators stay
    /// as tombstones so handles keep their meaning.
    spectators: Vec<Option<(usize, PeerConnection<T>)>>,
    local_player: Option<usize>,

    /// The authoritative local view of every player queue's progress, piggybacked on every
    /// outgoing input packet.
    local_connect_status: Vec<ConnectionStatus>,

    /// The earliest frame a disconnect adjustment still has to rewind to.
    disconnect_frame: Frame,
    /// The next confirmed frame to broadcast to spectators and the input sink.
    next_spectator_frame: Frame,
    /// The soonest frame a new sleep recommendation may be issued at.
    next_recommended_sleep: Frame,

    input_sink: Option<Box<dyn ConfirmedInputSink<T>>>,
}

impl<T: Config> P2PSession<T> {
    /// Creates a session from an options value and a transport. Configuration errors are
    /// programmer errors and fail fatally.
    pub fn new(config: SessionConfig, socket: impl NonBlockingSocket + 'static) -> Self {
        config.assert_valid();
        let (inbound_tx, inbound_rx) = unbounded();
        let mut players = Vec::with_capacity(config.num_players);
        players.resize_with(config.num_players, || None);
        Self {
            state: SessionState::Initializing,
            synchronizer: Synchronizer::new(&config),
            socket: Arc::new(socket),
            jobs: BackgroundJobManager::new(),
            inbound_rx,
            inbound_tx: Some(inbound_tx),
            players,
            spectators: Vec::new(),
            local_player: None,
            local_connect_status: vec![ConnectionStatus::default(); config.num_players],
            disconnect_frame: Frame::NULL,
            next_spectator_frame: Frame::ZERO,
            next_recommended_sleep: Frame::ZERO,
            input_sink: None,
            config,
        }
    }

    /// Registers a participant. Players can only be added before `start_session`;
    /// spectators additionally while the session is still synchronizing.
    pub fn add_player(
        &mut self,
        player_type: PlayerType,
        number: usize,
    ) -> Result<PlayerHandle, RollnetError> {
        match player_type {
            PlayerType::Local => {
                if self.state != SessionState::Initializing {
                    return Err(RollnetError::AlreadySynchronized);
                }
                if number >= self.config.num_players {
                    return Err(RollnetError::TooManyPlayers);
                }
                if self.players[number].is_some() {
                    return Err(RollnetError::DuplicatedPlayer);
                }
                if self.local_player.is_some() {
                    // one local player per session; further local participants need their
                    // own session
                    return Err(RollnetError::NotSupported);
                }
                self.local_player = Some(number);
                self.players[number] = Some(PlayerSlot::Local);
                self.synchronizer.set_frame_delay(number, self.config.frame_delay);
                Ok(PlayerHandle {
                    kind: PlayerKind::Local,
                    number,
                    queue: number,
                })
            }
            PlayerType::Remote(peer_addr) => {
                if self.state != SessionState::Initializing {
                    return Err(RollnetError::AlreadySynchronized);
                }
                if number >= self.config.num_players {
                    return Err(RollnetError::TooManyPlayers);
                }
                if self.players[number].is_some() {
                    return Err(RollnetError::DuplicatedPlayer);
                }
                let endpoint = PeerConnection::new(
                    peer_addr,
                    vec![number],
                    number as u8,
                    std::mem::size_of::<T::Input>(),
                    self.socket.clone(),
                    &self.config,
                );
                self.players[number] = Some(PlayerSlot::Remote(endpoint));
                Ok(PlayerHandle {
                    kind: PlayerKind::Remote,
                    number,
                    queue: number,
                })
            }
            PlayerType::Spectator(peer_addr) => {
                if self.state == SessionState::Running {
                    return Err(RollnetError::AlreadySynchronized);
                }
                if self.spectators.iter().flatten().count() >= MAX_SPECTATORS {
                    return Err(RollnetError::TooManySpectators);
                }
                if self
                    .spectators
                    .iter()
                    .flatten()
                    .any(|(existing, _)| *existing == number)
                {
                    return Err(RollnetError::DuplicatedPlayer);
                }
                // the whole confirmed input set of every frame goes to spectators
                let mut endpoint = PeerConnection::new(
                    peer_addr,
                    Vec::new(),
                    0,
                    std::mem::size_of::<T::Input>() * self.config.num_players,
                    self.socket.clone(),
                    &self.config,
                );
                if self.state == SessionState::Synchronizing {
                    endpoint.synchronize();
                }
                let queue = self.spectators.len();
                self.spectators.push(Some((number, endpoint)));
                Ok(PlayerHandle {
                    kind: PlayerKind::Spectator,
                    number,
                    queue,
                })
            }
        }
    }

    /// Starts the background transport worker and the handshakes with all peers.
    ///
    /// # Panics
    /// Panics if a player slot is still unfilled; registering too few players is a
    /// programmer error.
    pub fn start_session(&mut self) -> Result<(), RollnetError> {
        if self.state != SessionState::Initializing {
            return Err(RollnetError::AlreadySynchronized);
        }
        for (queue, slot) in self.players.iter().enumerate() {
            assert!(slot.is_some(), "player {} has not been added", queue);
        }

        let inbound_tx = self.inbound_tx.take().expect("session started twice");
        self.jobs.spawn_receive_pump(self.socket.clone(), inbound_tx);

        self.state = SessionState::Synchronizing;
        for endpoint in self.remote_endpoints_mut() {
            endpoint.synchronize();
        }
        for (_, endpoint) in self.spectators.iter_mut().flatten() {
            endpoint.synchronize();
        }
        debug!("session started, synchronizing");
        Ok(())
    }

    /// The per-tick bookkeeping: drains the network, drives the protocol timers, applies
    /// remote inputs, rolls back on mispredictions, advances the confirmed frame, feeds
    /// spectators and emits time-sync recommendations. Call once at the top of every tick.
    pub fn begin_frame(&mut self, handler: &mut dyn SessionHandler<T>) -> Result<(), RollnetError> {
        self.jobs.throw_if_error()?;

        self.drain_inbound();
        self.process_endpoint_events(handler);

        if self.state == SessionState::Synchronizing {
            // a session without pending handshakes becomes ready right away
            self.check_initial_sync(handler);
        }
        if self.state != SessionState::Running {
            return Ok(());
        }

        // find the minimum confirmed frame, force-disconnecting queues that fell behind
        let min_confirmed = self.min_confirmed_frame(handler)?;

        // roll back if a misprediction or a disconnect adjustment is pending
        let disconnect_frame = self.disconnect_frame;
        self.disconnect_frame = Frame::NULL;
        self.synchronizer
            .check_simulation(disconnect_frame, &self.local_connect_status, handler)?;

        // publish the current frame so quality reports carry the correct advantage
        let current_frame = self.synchronizer.current_frame();
        for endpoint in self.remote_endpoints_mut() {
            if endpoint.is_running() {
                endpoint.update_local_frame_advantage(current_frame);
            }
        }

        // broadcast confirmed inputs, then discard everything before the confirmed frame
        self.feed_confirmed_inputs(min_confirmed);
        self.synchronizer.set_last_confirmed_frame(min_confirmed);

        // throttle recommendation at most every recommendation_interval frames
        if current_frame > self.next_recommended_sleep {
            let skip_frames = self
                .remote_endpoints()
                .filter(|endpoint| endpoint.is_running())
                .map(|endpoint| endpoint.recommended_sleep())
                .max()
                .unwrap_or(0);
            if skip_frames > 0 {
                self.next_recommended_sleep = current_frame + self.config.recommendation_interval;
                handler.time_sync(skip_frames);
            }
        }

        Ok(())
    }

    /// Registers the local input for the current frame and transmits it to all remotes.
    pub fn add_local_input(
        &mut self,
        player: PlayerHandle,
        input: T::Input,
    ) -> Result<(), RollnetError> {
        if player.kind != PlayerKind::Local {
            return Err(RollnetError::InvalidPlayerHandle);
        }
        if player.number >= self.config.num_players {
            return Err(RollnetError::PlayerOutOfRange);
        }
        if self.local_player != Some(player.queue) {
            return Err(RollnetError::InvalidPlayerHandle);
        }
        if self.state != SessionState::Running {
            return Err(RollnetError::NotSynchronized);
        }
        if self.synchronizer.in_rollback() {
            return Err(RollnetError::InRollback);
        }

        let game_input = GameInput::new(self.synchronizer.current_frame(), input);
        let actual_frame = self.synchronizer.add_local_input(player.queue, game_input)?;

        // a null frame means the queue dropped the input (input delay shrank); nothing to
        // transmit then
        if !actual_frame.is_null() {
            self.local_connect_status[player.queue].last_frame = actual_frame;

            let payload = FrameBytes {
                frame: actual_frame,
                bytes: bytemuck::bytes_of(&input).to_vec(),
            };
            let connect_status = self.local_connect_status.clone();
            let mut all_sent = true;
            for endpoint in self.remote_endpoints_mut() {
                all_sent &= endpoint.send_input(payload.clone(), &connect_status);
            }
            if !all_sent {
                return Err(RollnetError::InputDropped);
            }
        }
        Ok(())
    }

    /// Returns one input per player for the current frame, predictions included.
    pub fn synchronize_inputs(&mut self) -> Result<Vec<(T::Input, InputStatus)>, RollnetError> {
        if self.state != SessionState::Running {
            return Err(RollnetError::NotSynchronized);
        }
        Ok(self.synchronizer.synchronize_inputs(&self.local_connect_status))
    }

    /// Ends the tick after the host advanced its simulation: bumps the frame counter and
    /// saves the new state.
    pub fn advance_frame(&mut self, handler: &mut dyn SessionHandler<T>) -> Result<(), RollnetError> {
        if self.state != SessionState::Running {
            return Err(RollnetError::NotSynchronized);
        }
        self.synchronizer.increment_frame(handler);
        Ok(())
    }

    /// Disconnects a participant. Remote players are rolled back to their last confirmed
    /// frame and treated as absent from there on.
    pub fn disconnect_player(
        &mut self,
        player: PlayerHandle,
        handler: &mut dyn SessionHandler<T>,
    ) -> Result<(), RollnetError> {
        match player.kind {
            PlayerKind::Local => Err(RollnetError::InvalidPlayerHandle),
            PlayerKind::Remote => {
                if self.local_connect_status[player.queue].disconnected {
                    return Err(RollnetError::InvalidPlayerHandle);
                }
                let last_frame = self.local_connect_status[player.queue].last_frame;
                self.disconnect_player_queue(player.queue, last_frame, handler);
                Ok(())
            }
            PlayerKind::Spectator => {
                let (number, endpoint) = self
                    .spectators
                    .get_mut(player.queue)
                    .and_then(|slot| slot.as_mut())
                    .ok_or(RollnetError::InvalidPlayerHandle)?;
                let number = *number;
                endpoint.disconnect();
                handler.on_peer_event(
                    PlayerHandle {
                        kind: PlayerKind::Spectator,
                        number,
                        queue: player.queue,
                    },
                    PeerEvent::Disconnected,
                );
                Ok(())
            }
        }
    }

    /// Network quality statistics for a remote player or spectator.
    pub fn get_network_stats(&self, player: PlayerHandle) -> Result<NetworkStats, RollnetError> {
        let endpoint = match player.kind {
            PlayerKind::Local => return Err(RollnetError::InvalidPlayerHandle),
            PlayerKind::Remote => match self.players.get(player.queue) {
                Some(Some(PlayerSlot::Remote(endpoint))) => endpoint,
                _ => return Err(RollnetError::InvalidPlayerHandle),
            },
            PlayerKind::Spectator => match self.spectators.get(player.queue) {
                Some(Some((_, endpoint))) => endpoint,
                _ => return Err(RollnetError::InvalidPlayerHandle),
            },
        };
        endpoint.network_stats().ok_or(RollnetError::NotSynchronized)
    }

    /// Changes the input delay of the local player.
    pub fn set_frame_delay(
        &mut self,
        player: PlayerHandle,
        delay: usize,
    ) -> Result<(), RollnetError> {
        if player.kind != PlayerKind::Local || self.local_player != Some(player.queue) {
            return Err(RollnetError::InvalidPlayerHandle);
        }
        self.synchronizer.set_frame_delay(player.queue, delay);
        Ok(())
    }

    /// Registers a listener that receives every confirmed frame of inputs, the same stream
    /// spectators get. Must be registered before the session starts.
    pub fn set_confirmed_input_sink(&mut self, sink: Box<dyn ConfirmedInputSink<T>>) {
        self.input_sink = Some(sink);
    }

    /// Shuts the session down: notifies the host, disconnects all peers and stops the
    /// background worker.
    pub fn close(&mut self, handler: &mut dyn SessionHandler<T>) {
        handler.on_session_close();
        for endpoint in self.remote_endpoints_mut() {
            endpoint.disconnect();
        }
        for (_, endpoint) in self.spectators.iter_mut().flatten() {
            endpoint.disconnect();
        }
        self.jobs.stop(SHUTDOWN_GRACE);
        self.state = SessionState::Initializing;
    }

    pub const fn current_state(&self) -> SessionState {
        self.state
    }

    pub fn current_frame(&self) -> Frame {
        self.synchronizer.current_frame()
    }

    pub fn num_players(&self) -> usize {
        self.config.num_players
    }

    /// The handle of the local player, if one was added.
    pub fn local_player_handle(&self) -> Option<PlayerHandle> {
        self.local_player.map(|queue| PlayerHandle {
            kind: PlayerKind::Local,
            number: queue,
            queue,
        })
    }

    // ###################
    // # per-tick pieces #
    // ###################

    /// Routes every message the background worker queued to the endpoint that owns the
    /// sender address, preserving per-peer receive order.
    fn drain_inbound(&mut self) {
        while let Ok((from, msg)) = self.inbound_rx.try_recv() {
            let mut handled = false;
            for slot in self.players.iter_mut() {
                if let Some(PlayerSlot::Remote(endpoint)) = slot {
                    if endpoint.is_handling_message(&from) {
                        endpoint.handle_message(&msg);
                        handled = true;
                        break;
                    }
                }
            }
            if handled {
                continue;
            }
            for slot in self.spectators.iter_mut().flatten() {
                if slot.1.is_handling_message(&from) {
                    slot.1.handle_message(&msg);
                    break;
                }
            }
        }
    }

    /// Drives every endpoint's timers and handles the produced events.
    fn process_endpoint_events(&mut self, handler: &mut dyn SessionHandler<T>) {
        let mut events = VecDeque::new();
        for (queue, slot) in self.players.iter_mut().enumerate() {
            if let Some(PlayerSlot::Remote(endpoint)) = slot {
                for event in endpoint.update(&self.local_connect_status) {
                    events.push_back((event, EndpointId::Player(queue)));
                }
            }
        }
        for (index, slot) in self.spectators.iter_mut().enumerate() {
            if let Some((_, endpoint)) = slot {
                for event in endpoint.update(&self.local_connect_status) {
                    events.push_back((event, EndpointId::Spectator(index)));
                }
            }
        }

        for (event, id) in events {
            self.handle_event(event, id, handler);
        }
    }

    fn handle_event(
        &mut self,
        event: Event<T>,
        id: EndpointId,
        handler: &mut dyn SessionHandler<T>,
    ) {
        let player = self.handle_for(id);
        match event {
            Event::Connected => handler.on_peer_event(player, PeerEvent::Connected),
            Event::Synchronizing { total, count } => {
                handler.on_peer_event(player, PeerEvent::Synchronizing { total, count });
            }
            Event::Synchronized { ping } => {
                handler.on_peer_event(player, PeerEvent::Synchronized { ping });
                self.check_initial_sync(handler);
            }
            Event::NetworkInterrupted { disconnect_timeout } => {
                handler.on_peer_event(player, PeerEvent::NetworkInterrupted { disconnect_timeout });
            }
            Event::NetworkResumed => handler.on_peer_event(player, PeerEvent::NetworkResumed),
            Event::SyncFailure => match id {
                // a spectator that cannot connect is dropped silently
                EndpointId::Spectator(index) => {
                    warn!(spectator = index, "removing spectator after failed handshake");
                    self.spectators[index] = None;
                    self.check_initial_sync(handler);
                }
                EndpointId::Player(_) => {
                    handler.on_peer_event(player, PeerEvent::SynchronizationFailure);
                }
            },
            Event::Disconnected => match id {
                EndpointId::Player(queue) => {
                    let last_frame = self.local_connect_status[queue].last_frame;
                    self.disconnect_player_queue(queue, last_frame, handler);
                }
                EndpointId::Spectator(index) => {
                    if let Some((_, endpoint)) = &mut self.spectators[index] {
                        endpoint.disconnect();
                    }
                    handler.on_peer_event(player, PeerEvent::Disconnected);
                }
            },
            Event::Input { player: queue, input } => {
                if !self.local_connect_status[queue].disconnected {
                    // the inbox guarantees per-queue frame order
                    let last_frame = self.local_connect_status[queue].last_frame;
                    assert!(last_frame.is_null() || last_frame.next() == input.frame);
                    self.local_connect_status[queue].last_frame = input.frame;
                    self.synchronizer.add_remote_input(queue, input);
                }
            }
        }
    }

    fn handle_for(&self, id: EndpointId) -> PlayerHandle {
        match id {
            EndpointId::Player(queue) => PlayerHandle {
                kind: PlayerKind::Remote,
                number: queue,
                queue,
            },
            EndpointId::Spectator(index) => PlayerHandle {
                kind: PlayerKind::Spectator,
                number: self
                    .spectators
                    .get(index)
                    .and_then(|slot| slot.as_ref().map(|(number, _)| *number))
                    .unwrap_or(index),
                queue: index,
            },
        }
    }

    /// Flips the session to running once every endpoint finished its handshake. The host
    /// learns about it exactly once, and the frame 0 snapshot is taken.
    fn check_initial_sync(&mut self, handler: &mut dyn SessionHandler<T>) {
        if self.state != SessionState::Synchronizing {
            return;
        }
        let all_synchronized = self
            .remote_endpoints()
            .all(|endpoint| endpoint.is_synchronized())
            && self
                .spectators
                .iter()
                .flatten()
                .all(|(_, endpoint)| endpoint.is_synchronized());
        if !all_synchronized {
            return;
        }

        debug!("all endpoints synchronized, session is running");
        self.state = SessionState::Running;
        handler.on_session_start();
        self.synchronizer.save_current_state(handler);
    }

    /// The minimum frame every participant has confirmed. With the agreement path, a
    /// player's frame only counts once all peers report at least that frame for them; a
    /// queue that some peer reports disconnected is force-disconnected locally.
    fn min_confirmed_frame(
        &mut self,
        handler: &mut dyn SessionHandler<T>,
    ) -> Result<Frame, RollnetError> {
        let shortcut =
            self.config.two_player_confirm_shortcut && self.config.num_players <= 2;
        let mut total_min_confirmed = Frame::MAX;
        let mut to_disconnect = Vec::new();

        for queue in 0..self.config.num_players {
            let mut queue_connected = true;
            let mut queue_min_confirmed = Frame::MAX;

            if !shortcut {
                // every peer must agree on this queue's progress
                for endpoint in self.remote_endpoints() {
                    if !endpoint.is_running() {
                        continue;
                    }
                    let status = endpoint.peer_connect_status(queue);
                    queue_connected = queue_connected && !status.disconnected;
                    queue_min_confirmed = queue_min_confirmed.min(status.last_frame);
                }
            } else if let Some(Some(PlayerSlot::Remote(endpoint))) = self.players.get(queue) {
                if endpoint.is_running() {
                    queue_connected = !endpoint.peer_connect_status(queue).disconnected;
                }
            }

            let local_status = self.local_connect_status[queue];
            if !local_status.disconnected {
                queue_min_confirmed = queue_min_confirmed.min(local_status.last_frame);
            }

            if queue_connected {
                total_min_confirmed = total_min_confirmed.min(queue_min_confirmed);
            } else {
                // a peer already disconnected this queue, possibly at an earlier frame than
                // we did; re-adjust in that case
                if !local_status.disconnected || local_status.last_frame > queue_min_confirmed {
                    to_disconnect.push((queue, queue_min_confirmed));
                }
            }
        }

        for (queue, frame) in to_disconnect {
            debug!(queue, frame = frame.number(), "disconnecting queue by remote request");
            self.disconnect_player_queue(queue, frame, handler);
        }

        assert!(total_min_confirmed < Frame::MAX);
        Ok(total_min_confirmed)
    }

    /// Marks a queue disconnected at `sync_to` and schedules the rewind that replays the
    /// frames after it with that player absent.
    fn disconnect_player_queue(
        &mut self,
        queue: usize,
        sync_to: Frame,
        handler: &mut dyn SessionHandler<T>,
    ) {
        let was_disconnected = self.local_connect_status[queue].disconnected;
        if let Some(PlayerSlot::Remote(endpoint)) = &mut self.players[queue] {
            endpoint.disconnect();
        }

        self.local_connect_status[queue].disconnected = true;
        self.local_connect_status[queue].last_frame = sync_to;

        let adjust_from = sync_to.next();
        if adjust_from < self.synchronizer.current_frame() {
            // resimulate from right after the last confirmed frame with the player gone
            self.disconnect_frame = if self.disconnect_frame.is_null() {
                adjust_from
            } else {
                self.disconnect_frame.min(adjust_from)
            };
            debug!(
                queue,
                from = adjust_from.number(),
                "scheduling disconnect adjustment"
            );
        }

        if !was_disconnected {
            handler.on_peer_event(
                PlayerHandle {
                    kind: PlayerKind::Remote,
                    number: queue,
                    queue,
                },
                PeerEvent::Disconnected,
            );
        }

        self.check_initial_sync(handler);
    }

    /// Sends every newly confirmed frame to all running spectators and the input sink.
    fn feed_confirmed_inputs(&mut self, min_confirmed: Frame) {
        let has_spectators = self.spectators.iter().flatten().count() > 0;
        if !has_spectators && self.input_sink.is_none() {
            return;
        }

        while self.next_spectator_frame <= min_confirmed {
            let confirmed = self
                .synchronizer
                .confirmed_inputs(self.next_spectator_frame, &self.local_connect_status);

            let mut bytes =
                Vec::with_capacity(std::mem::size_of::<T::Input>() * self.config.num_players);
            for input in confirmed.inputs() {
                bytes.extend_from_slice(bytemuck::bytes_of(input));
            }
            let payload = FrameBytes {
                frame: self.next_spectator_frame,
                bytes,
            };

            let connect_status = self.local_connect_status.clone();
            for (_, endpoint) in self.spectators.iter_mut().flatten() {
                if endpoint.is_running() {
                    endpoint.send_input(payload.clone(), &connect_status);
                }
            }
            if let Some(sink) = &mut self.input_sink {
                sink.on_confirmed_inputs(&confirmed);
            }

            self.next_spectator_frame = self.next_spectator_frame.next();
        }
    }

    fn remote_endpoints(&self) -> impl Iterator<Item = &PeerConnection<T>> {
        self.players.iter().filter_map(|slot| match slot {
            Some(PlayerSlot::Remote(endpoint)) => Some(endpoint),
            _ => None,
        })
    }

    fn remote_endpoints_mut(&mut self) -> impl Iterator<Item = &mut PeerConnection<T>> {
        self.players.iter_mut().filter_map(|slot| match slot {
            Some(PlayerSlot::Remote(endpoint)) => Some(endpoint),
            _ => None,
        })
    }
}
