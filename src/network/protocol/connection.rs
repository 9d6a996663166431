use std::collections::vec_deque::Drain;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use instant::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::frame::Frame;
use crate::frame_info::GameInput;
use crate::network::messages::{
    ConnectionStatus, InputAck, Message, MessageBody, QualityReply, QualityReport, SyncReply,
};
use crate::network::protocol::handshake::{HandshakeEvent, ProtocolSynchronizer};
use crate::network::protocol::inbox::ProtocolInbox;
use crate::network::protocol::input_buffer::{FrameBytes, ProtocolInputBuffer, PushOutcome};
use crate::network::protocol::outbox::ProtocolOutbox;
use crate::network::socket::NonBlockingSocket;
use crate::network::stats::NetworkStats;
use crate::time_sync::TimeSync;
use crate::Config;

/// How long a disconnected connection keeps draining stray packets before shutting down.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(5000);
const SYNC_RETRY_INTERVAL: Duration = Duration::from_millis(200);
/// Cadence for retransmitting the pending input window while nothing new arrives.
const SEND_LATENCY: Duration = Duration::from_millis(200);

pub(crate) fn millis_since_epoch() -> u64 {
    #[cfg(not(target_arch = "wasm32"))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time went backwards")
            .as_millis() as u64
    }
    #[cfg(target_arch = "wasm32")]
    {
        js_sys::Date::new_0().get_time() as u64
    }
}

/// Events a peer connection hands to the session. All but `Input` are forwarded to the
/// host as peer events.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event<T>
where
    T: Config,
{
    /// The peer answered the first handshake packet.
    Connected,
    /// The handshake made progress; it completes after `total` roundtrips.
    Synchronizing { total: u32, count: u32 },
    /// The handshake completed.
    Synchronized { ping: u128 },
    /// An authoritative input arrived for one of the queues this peer feeds.
    Input {
        player: usize,
        input: GameInput<T::Input>,
    },
    /// The peer has been inactive past the disconnect timeout or asked to disconnect.
    Disconnected,
    /// The peer has been inactive for a while and will be disconnected soon.
    NetworkInterrupted { disconnect_timeout: u128 },
    /// Packets from the peer are arriving again.
    NetworkResumed,
    /// The handshake did not complete in time.
    SyncFailure,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PeerState {
    Initializing,
    Syncing,
    Running,
    Disconnected,
    Shutdown,
}

/// The per-peer wire protocol state machine. Composes the four protocol halves (outbox,
/// handshake, outgoing input window and inbox) and owns the timers for resends, quality
/// reports, keep-alives and inactivity detection.
///
/// All methods run on the host thread; received messages are handed in by the session
/// after the background worker queued them.
#[derive(Debug)]
pub(crate) struct PeerConnection<T>
where
    T: Config,
{
    state: PeerState,
    peer_addr: SocketAddr,
    /// The queue index byte announced in handshake requests.
    local_endpoint: u8,

    outbox: ProtocolOutbox,
    handshake: ProtocolSynchronizer,
    input_buffer: ProtocolInputBuffer,
    inbox: ProtocolInbox<T>,

    event_queue: VecDeque<Event<T>>,

    // frame advantage bookkeeping
    time_sync: TimeSync,
    local_frame_advantage: i32,
    remote_frame_advantage: i32,

    // timers
    fps: usize,
    keep_alive_interval: Duration,
    quality_report_interval: Duration,
    disconnect_timeout: Duration,
    disconnect_notify_start: Duration,
    last_recv_time: Instant,
    last_input_recv_time: Instant,
    last_quality_report_time: Instant,
    shutdown_at: Instant,
    disconnect_notify_sent: bool,
    disconnect_event_sent: bool,

    // network statistics
    stats_start: Instant,
    round_trip_time: u128,
}

impl<T: Config> PeerConnection<T> {
    /// `recv_queues` are the internal queues this peer's input stream feeds (exactly one
    /// for a remote player, all of them for the upstream connection of a spectator).
    /// `send_input_size` is the byte size of one outgoing input frame.
    pub(crate) fn new(
        peer_addr: SocketAddr,
        recv_queues: Vec<usize>,
        local_endpoint: u8,
        send_input_size: usize,
        socket: Arc<dyn NonBlockingSocket>,
        config: &SessionConfig,
    ) -> Self {
        let mut magic = rand::random::<u16>();
        while magic == 0 {
            magic = rand::random::<u16>();
        }

        Self {
            state: PeerState::Initializing,
            peer_addr,
            local_endpoint,
            outbox: ProtocolOutbox::new(socket, peer_addr, magic),
            handshake: ProtocolSynchronizer::new(config.sync_packets, config.disconnect_timeout),
            input_buffer: ProtocolInputBuffer::new(send_input_size),
            inbox: ProtocolInbox::new(recv_queues, config.num_players),
            event_queue: VecDeque::new(),
            time_sync: TimeSync::new(
                config.time_sync_window,
                config.min_frame_advantage,
                config.max_frame_advantage,
            ),
            local_frame_advantage: 0,
            remote_frame_advantage: 0,
            fps: config.fps,
            keep_alive_interval: config.keep_alive_interval,
            quality_report_interval: config.quality_report_interval,
            disconnect_timeout: config.disconnect_timeout,
            disconnect_notify_start: config.disconnect_notify_start,
            last_recv_time: Instant::now(),
            last_input_recv_time: Instant::now(),
            last_quality_report_time: Instant::now(),
            shutdown_at: Instant::now(),
            disconnect_notify_sent: false,
            disconnect_event_sent: false,
            stats_start: Instant::now(),
            round_trip_time: 0,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state == PeerState::Running
    }

    /// Whether this connection no longer stands in the way of the initial sync gate.
    pub(crate) fn is_synchronized(&self) -> bool {
        matches!(
            self.state,
            PeerState::Running | PeerState::Disconnected | PeerState::Shutdown
        )
    }

    pub(crate) fn is_handling_message(&self, addr: &SocketAddr) -> bool {
        self.peer_addr == *addr
    }

    pub(crate) fn peer_connect_status(&self, queue: usize) -> ConnectionStatus {
        self.inbox.peer_connect_status(queue)
    }

    /// Starts the handshake.
    pub(crate) fn synchronize(&mut self) {
        assert_eq!(self.state, PeerState::Initializing);
        self.state = PeerState::Syncing;
        self.stats_start = Instant::now();
        self.handshake.begin();
        self.send_sync_request();
    }

    /// Marks the connection as disconnected. Stray packets are drained for a grace window
    /// so a slow peer does not resurrect the connection.
    pub(crate) fn disconnect(&mut self) {
        if self.state == PeerState::Shutdown {
            return;
        }
        self.state = PeerState::Disconnected;
        self.shutdown_at = Instant::now() + SHUTDOWN_GRACE;
    }

    /// Estimates our frame lead over the peer: positive means the peer will have to
    /// predict more often than we do and we are the ones who should slow down.
    pub(crate) fn update_local_frame_advantage(&mut self, local_frame: Frame) {
        if local_frame.is_null() || self.inbox.last_recv_frame().is_null() {
            return;
        }
        // estimate the frame the peer is on right now from its last input and the packet
        // travel time
        let ping = i32::try_from(self.round_trip_time / 2).expect("ping exceeds i32::MAX");
        let remote_frame =
            self.inbox.last_recv_frame().number() + (ping * self.fps as i32) / 1000;
        self.local_frame_advantage = local_frame.number() - remote_frame;
    }

    pub(crate) fn recommended_sleep(&self) -> u32 {
        self.time_sync.recommended_sleep()
    }

    pub(crate) fn network_stats(&self) -> Option<NetworkStats> {
        if self.state != PeerState::Syncing && self.state != PeerState::Running {
            return None;
        }

        let seconds = self.stats_start.elapsed().as_secs();
        if seconds == 0 {
            return None;
        }

        Some(NetworkStats {
            ping: self.round_trip_time,
            send_queue_len: self.input_buffer.len(),
            kbps_sent: self.outbox.bytes_sent() / seconds as usize / 1024,
            local_frames_ahead: self.local_frame_advantage,
            remote_frames_ahead: self.remote_frame_advantage,
        })
    }

    /// Drives the timers: handshake retries, input retransmission, quality reports,
    /// keep-alives and the inactivity thresholds. Returns the pending events.
    pub(crate) fn update(&mut self, connect_status: &[ConnectionStatus]) -> Drain<'_, Event<T>> {
        let now = Instant::now();
        match self.state {
            PeerState::Syncing => {
                if self.handshake.timed_out() {
                    warn!(peer = %self.peer_addr, "handshake timed out");
                    self.event_queue.push_back(Event::SyncFailure);
                    self.state = PeerState::Shutdown;
                } else if self.outbox.last_send_time() + SYNC_RETRY_INTERVAL < now {
                    self.send_sync_request();
                }
            }
            PeerState::Running => {
                // retransmit the pending window if no new inputs arrived for a while
                if self.last_input_recv_time + SEND_LATENCY < now {
                    self.send_pending_inputs(connect_status);
                    self.last_input_recv_time = Instant::now();
                }

                if self.last_quality_report_time + self.quality_report_interval < now {
                    self.last_quality_report_time = now;
                    let report = QualityReport {
                        frame_advantage: self
                            .local_frame_advantage
                            .clamp(i8::MIN as i32, i8::MAX as i32)
                            as i8,
                        ping: millis_since_epoch(),
                    };
                    self.outbox.send(MessageBody::QualityReport(report));
                }

                if self.outbox.last_send_time() + self.keep_alive_interval < now {
                    self.outbox.send(MessageBody::KeepAlive);
                }

                if !self.disconnect_notify_sent
                    && self.last_recv_time + self.disconnect_notify_start < now
                {
                    let remaining = self.disconnect_timeout - self.disconnect_notify_start;
                    self.event_queue.push_back(Event::NetworkInterrupted {
                        disconnect_timeout: remaining.as_millis(),
                    });
                    self.disconnect_notify_sent = true;
                }

                if !self.disconnect_event_sent
                    && self.last_recv_time + self.disconnect_timeout < now
                {
                    self.event_queue.push_back(Event::Disconnected);
                    self.disconnect_event_sent = true;
                }
            }
            PeerState::Disconnected => {
                if self.shutdown_at < now {
                    self.state = PeerState::Shutdown;
                }
            }
            PeerState::Initializing | PeerState::Shutdown => (),
        }
        self.event_queue.drain(..)
    }

    /// Queues one frame of local input for transmission and sends the updated window.
    /// Returns `false` if the transport dropped the send.
    pub(crate) fn send_input(
        &mut self,
        input: FrameBytes,
        connect_status: &[ConnectionStatus],
    ) -> bool {
        if self.state != PeerState::Running {
            return true;
        }

        self.time_sync.advance_frame(
            input.frame,
            self.local_frame_advantage,
            self.remote_frame_advantage,
        );

        if self.input_buffer.push(input) == PushOutcome::Overflow {
            // the peer ignored a whole window of inputs; a remote player would have
            // stalled us at the prediction threshold long ago, so this is a spectator
            // beyond saving
            warn!(peer = %self.peer_addr, "pending input overflow");
            if !self.disconnect_event_sent {
                self.event_queue.push_back(Event::Disconnected);
                self.disconnect_event_sent = true;
            }
            return true;
        }

        self.send_pending_inputs(connect_status)
    }

    fn send_pending_inputs(&mut self, connect_status: &[ConnectionStatus]) -> bool {
        let body = self.input_buffer.make_body(
            self.inbox.last_recv_frame(),
            self.state == PeerState::Disconnected,
            connect_status,
        );
        match body {
            Some(body) => self.outbox.send(MessageBody::Input(body)),
            None => true,
        }
    }

    fn send_sync_request(&mut self) {
        // announces the remote magic we know so far (0 until the handshake learned it)
        let request = self
            .handshake
            .next_request(self.inbox.remote_magic(), self.local_endpoint);
        self.outbox.send(MessageBody::SyncRequest(request));
    }

    /// Handles one received message. Called on the host thread while draining the inbound
    /// queue, in per-peer receive order.
    pub(crate) fn handle_message(&mut self, msg: &Message) {
        if self.state == PeerState::Shutdown {
            return;
        }

        if !self.inbox.accepts(&msg.header) {
            return;
        }

        self.last_recv_time = Instant::now();

        // if the connection was flagged interrupted, signal that we are receiving again
        if self.disconnect_notify_sent && self.state == PeerState::Running {
            self.disconnect_notify_sent = false;
            self.event_queue.push_back(Event::NetworkResumed);
        }

        match &msg.body {
            MessageBody::SyncRequest(body) => {
                let reply = SyncReply {
                    random_reply: body.random_request,
                };
                self.outbox.send(MessageBody::SyncReply(reply));
            }
            MessageBody::SyncReply(body) => self.on_sync_reply(*body, msg.header.magic),
            MessageBody::Input(body) => {
                self.input_buffer.ack(body.ack_frame);

                if body.disconnect_requested {
                    if self.state != PeerState::Disconnected && !self.disconnect_event_sent {
                        self.event_queue.push_back(Event::Disconnected);
                        self.disconnect_event_sent = true;
                    }
                } else {
                    let outcome = self.inbox.handle_input(body, &mut self.event_queue);
                    if outcome.accepted {
                        self.last_input_recv_time = Instant::now();
                    }
                    if outcome.send_ack {
                        let ack = InputAck {
                            ack_frame: self.inbox.last_recv_frame(),
                        };
                        self.outbox.send(MessageBody::InputAck(ack));
                    }
                }
            }
            MessageBody::InputAck(body) => self.input_buffer.ack(body.ack_frame),
            MessageBody::QualityReport(body) => {
                self.remote_frame_advantage = body.frame_advantage as i32;
                let reply = QualityReply { pong: body.ping };
                self.outbox.send(MessageBody::QualityReply(reply));
            }
            MessageBody::QualityReply(body) => {
                self.round_trip_time = millis_since_epoch().saturating_sub(body.pong) as u128;
            }
            MessageBody::KeepAlive => (),
        }
    }

    fn on_sync_reply(&mut self, body: SyncReply, sender_magic: u16) {
        if self.state != PeerState::Syncing {
            return;
        }
        match self.handshake.handle_reply(body) {
            HandshakeEvent::Stale => (),
            HandshakeEvent::Progress {
                total,
                count,
                first_reply,
            } => {
                if first_reply {
                    self.event_queue.push_back(Event::Connected);
                }
                self.event_queue.push_back(Event::Synchronizing { total, count });
                self.send_sync_request();
            }
            HandshakeEvent::Finished { ping, first_reply } => {
                if first_reply {
                    self.event_queue.push_back(Event::Connected);
                }
                debug!(peer = %self.peer_addr, "connection synchronized");
                self.state = PeerState::Running;
                self.round_trip_time = ping;
                // only packets of this connection instance are accepted from now on
                self.inbox.set_remote_magic(sender_magic);
                self.event_queue.push_back(Event::Synchronized { ping });
            }
        }
    }
}
