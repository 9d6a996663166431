//! # rollnet
//! Rollnet is the session core of a peer-to-peer rollback netcode engine for
//! lockstep-deterministic simulations. Peers advance a shared simulation in lockstep while
//! wide-area latency is hidden by predicting remote inputs, running the simulation
//! speculatively and rolling back when the authoritative inputs disagree with the
//! prediction.
//!
//! The host registers a [`SessionHandler`] for state saving/loading and resimulation,
//! drives the session once per simulation tick (`begin_frame`, `add_local_input`,
//! `synchronize_inputs`, `advance_frame`) and stays otherwise in control of its own loop.
//! Network I/O runs on a single background worker owned by the session.

#![forbid(unsafe_code)]

use std::net::SocketAddr;

use bytemuck::{Pod, Zeroable};

pub use config::SessionConfig;
pub use error::RollnetError;
pub use frame::{Frame, FrameSpan};
pub use frame_info::{ConfirmedInputs, GameInput};
pub use network::messages::Message;
pub use network::socket::{NonBlockingSocket, UdpNonBlockingSocket};
pub use network::stats::NetworkStats;
pub use sessions::p2p_session::P2PSession;
pub use sessions::replay_session::ReplaySession;
pub use sessions::spectator_session::SpectatorSession;

pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod frame;
pub(crate) mod frame_info;
pub(crate) mod input_queue;
pub(crate) mod state_store;
pub(crate) mod synchronizer;
pub(crate) mod time_sync;
pub(crate) mod sessions {
    pub(crate) mod p2p_session;
    pub(crate) mod replay_session;
    pub(crate) mod spectator_session;
}
pub(crate) mod network {
    pub(crate) mod background;
    pub(crate) mod compression;
    pub(crate) mod messages;
    pub(crate) mod protocol {
        pub(crate) mod connection;
        pub(crate) mod handshake;
        pub(crate) mod inbox;
        pub(crate) mod input_buffer;
        pub(crate) mod outbox;
    }
    pub(crate) mod socket;
    pub(crate) mod stats;
}

// #############
// # CONSTANTS #
// #############

/// The compile-time maximum number of contributing players per session.
pub const MAX_PLAYERS: usize = 4;
/// The compile-time maximum number of spectators per session.
pub const MAX_SPECTATORS: usize = 32;

// ##########
// # TRAITS #
// ##########

/// Bound alias for input payloads: fixed-size, bit-copyable and comparable, so inputs can
/// be delta-encoded for the wire and compared against predictions bit by bit.
pub trait InputKind: Copy + PartialEq + Pod + Zeroable + Send + Sync + std::fmt::Debug + 'static {}
impl<I> InputKind for I where I: Copy + PartialEq + Pod + Zeroable + Send + Sync + std::fmt::Debug + 'static {}

/// Compile-time session configuration provided by the host.
pub trait Config: 'static {
    /// The input of a single player for a single frame.
    type Input: InputKind;
}

/// The host side of a session. The session calls back into this trait on the host thread,
/// only from within one of the session operations.
pub trait SessionHandler<T: Config> {
    /// All peers finished their handshakes; the session accepts input from now on.
    fn on_session_start(&mut self);
    /// The session is shutting down.
    fn on_session_close(&mut self);
    /// Serialize the current simulation state. The state must belong to `frame`.
    fn save_state(&mut self, frame: Frame) -> Vec<u8>;
    /// Restore the simulation state saved at `frame`.
    fn load_state(&mut self, frame: Frame, state: &[u8]);
    /// Advance the simulation by exactly one frame using `inputs`. Invoked only during
    /// resimulation after a rollback; ordinary frames are advanced by the host itself.
    fn advance_frame(&mut self, inputs: &[(T::Input, InputStatus)]);
    /// The local client is running ahead; the host should sit out `skip_frames` frames.
    fn time_sync(&mut self, skip_frames: u32);
    /// A peer changed state; purely informational except for `Disconnected`.
    fn on_peer_event(&mut self, player: PlayerHandle, event: PeerEvent);
}

/// Receives every fully-confirmed frame of inputs in order, the same stream that is sent
/// to spectators. Useful for recording replays on the host.
pub trait ConfirmedInputSink<T: Config> {
    fn on_confirmed_inputs(&mut self, inputs: &ConfirmedInputs<T::Input>);
}

// #############
// #   ENUMS   #
// #############

/// Defines the three types of participants a session considers:
/// - local players, who play on the local device,
/// - remote players, who play on other devices and
/// - spectators, who receive confirmed inputs but never contribute input.
///
/// Both `Remote` and `Spectator` have a socket address associated with them.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum PlayerType {
    /// This player plays on the local device.
    Local,
    /// This player plays on a remote device identified by the socket address.
    Remote(SocketAddr),
    /// This client spectates from a remote device identified by the socket address.
    Spectator(SocketAddr),
}

/// The participant kind recorded in a [`PlayerHandle`].
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum PlayerKind {
    Local,
    Remote,
    Spectator,
}

/// Identifies a participant of a session. Returned by `add_player` and required for all
/// per-player operations.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct PlayerHandle {
    pub(crate) kind: PlayerKind,
    pub(crate) number: usize,
    pub(crate) queue: usize,
}

impl PlayerHandle {
    pub fn kind(&self) -> PlayerKind {
        self.kind
    }

    /// The externally visible player number given to `add_player`.
    pub fn number(&self) -> usize {
        self.number
    }

    /// The dense internal queue index. Spectators are numbered separately from players.
    pub fn queue(&self) -> usize {
        self.queue
    }
}

/// A session is always in one of these states. Query it via `current_state()`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Players must be added and the session started to continue.
    Initializing,
    /// The session attempts to establish connections to the remote clients.
    Synchronizing,
    /// The session has synchronized and is ready to take and transmit player input.
    Running,
}

/// Tags each input returned by `synchronize_inputs` with its provenance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputStatus {
    /// The authoritative input of this player for this frame.
    Confirmed,
    /// A predicted stand-in; the real input has not arrived yet.
    Predicted,
    /// The player disconnected before this frame; the input is blank.
    Disconnected,
}

/// Peer state changes reported to the host through [`SessionHandler::on_peer_event`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The peer answered the first handshake packet.
    Connected,
    /// The handshake made progress; it completes after `total` roundtrips.
    Synchronizing { total: u32, count: u32 },
    /// The handshake completed, `ping` is the measured roundtrip in milliseconds.
    Synchronized { ping: u128 },
    /// No packets have arrived from this peer for a while. The peer is disconnected if
    /// this lasts another `disconnect_timeout` milliseconds.
    NetworkInterrupted { disconnect_timeout: u128 },
    /// Sent only after `NetworkInterrupted`, once packets arrive again.
    NetworkResumed,
    /// The peer has been disconnected.
    Disconnected,
    /// The handshake with this peer timed out.
    SynchronizationFailure,
}

/// The session kinds behind one contract: a full remote mesh, a spectator following a
/// single upstream host, or playback of a recorded input stream. Backend-specific
/// operations (adding players, network stats) are reached by matching on the variant.
pub enum Session<T: Config> {
    Remote(P2PSession<T>),
    Spectator(SpectatorSession<T>),
    Replay(ReplaySession<T>),
}

impl<T: Config> Session<T> {
    pub fn begin_frame(&mut self, handler: &mut dyn SessionHandler<T>) -> Result<(), RollnetError> {
        match self {
            Session::Remote(session) => session.begin_frame(handler),
            Session::Spectator(session) => session.begin_frame(handler),
            Session::Replay(session) => session.begin_frame(handler),
        }
    }

    /// Registers (and transmits) a local input for the current frame. Only meaningful for
    /// the remote backend; spectators and replays do not contribute input.
    pub fn add_local_input(
        &mut self,
        player: PlayerHandle,
        input: T::Input,
    ) -> Result<(), RollnetError> {
        match self {
            Session::Remote(session) => session.add_local_input(player, input),
            Session::Spectator(_) | Session::Replay(_) => Err(RollnetError::NotSupported),
        }
    }

    /// Returns the inputs of all players for the current frame, predicted where necessary.
    pub fn synchronize_inputs(&mut self) -> Result<Vec<(T::Input, InputStatus)>, RollnetError> {
        match self {
            Session::Remote(session) => session.synchronize_inputs(),
            Session::Spectator(session) => Ok(session
                .synchronize_inputs()?
                .inputs()
                .iter()
                .map(|&input| (input, InputStatus::Confirmed))
                .collect()),
            Session::Replay(session) => Ok(session
                .synchronize_inputs()?
                .inputs()
                .iter()
                .map(|&input| (input, InputStatus::Confirmed))
                .collect()),
        }
    }

    pub fn advance_frame(
        &mut self,
        handler: &mut dyn SessionHandler<T>,
    ) -> Result<(), RollnetError> {
        match self {
            Session::Remote(session) => session.advance_frame(handler),
            Session::Spectator(session) => session.advance_frame(),
            Session::Replay(session) => session.advance_frame(),
        }
    }

    pub fn current_state(&self) -> SessionState {
        match self {
            Session::Remote(session) => session.current_state(),
            Session::Spectator(session) => session.current_state(),
            Session::Replay(session) => session.current_state(),
        }
    }
}
