use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::Frame;

/// This enum contains all error values the session operations can return. Most API functions
/// return a [`Result<T, RollnetError>`].
///
/// [`Result<T, RollnetError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RollnetError {
    /// The session is not synchronized yet. Start the session and keep calling `begin_frame`
    /// until all remote clients finished their handshake.
    NotSynchronized,
    /// The operation is only valid before the session has synchronized, e.g. adding spectators
    /// once the session is running.
    AlreadySynchronized,
    /// The given player handle does not refer to a player this operation accepts.
    InvalidPlayerHandle,
    /// The player number lies outside the range this session was configured with.
    PlayerOutOfRange,
    /// The prediction threshold has been reached; no more local inputs can be accepted until
    /// remote inputs confirm some of the speculated frames.
    PredictionThreshold,
    /// The session is currently resimulating after a misprediction; local inputs cannot be
    /// accepted inside a rollback.
    InRollback,
    /// The local input was accepted, but transmitting it to at least one remote failed. The
    /// resend mechanism will still deliver it, but the host may want to know.
    InputDropped,
    /// All player slots of this session are taken.
    TooManyPlayers,
    /// The maximum number of spectators has been reached.
    TooManySpectators,
    /// A player with this number has been added before.
    DuplicatedPlayer,
    /// The session kind does not support this operation.
    NotSupported,
    /// The spectator fell so far behind the host that catching up is impossible.
    SpectatorTooFarBehind,
    /// A rollback target was no longer present in the saved-state ring. The shared simulation
    /// can no longer be repaired; the session must be closed.
    Desync {
        /// The frame whose snapshot was required but missing.
        frame: Frame,
    },
    /// The background transport failed; the error was latched and is re-thrown here.
    TransportFailure {
        /// Stringified cause of the failure.
        info: String,
    },
}

impl Display for RollnetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollnetError::NotSynchronized => {
                write!(
                    f,
                    "The session is not yet synchronized with all remote sessions."
                )
            }
            RollnetError::AlreadySynchronized => {
                write!(
                    f,
                    "The session has already synchronized; this operation is only valid before that."
                )
            }
            RollnetError::InvalidPlayerHandle => {
                write!(
                    f,
                    "The player handle does not refer to a valid player for this operation."
                )
            }
            RollnetError::PlayerOutOfRange => {
                write!(f, "The player number is outside the configured player range.")
            }
            RollnetError::PredictionThreshold => {
                write!(
                    f,
                    "Prediction threshold is reached, cannot proceed without catching up."
                )
            }
            RollnetError::InRollback => {
                write!(
                    f,
                    "Resimulation in progress, local inputs cannot be added right now."
                )
            }
            RollnetError::InputDropped => {
                write!(
                    f,
                    "The local input could not be transmitted to at least one remote."
                )
            }
            RollnetError::TooManyPlayers => {
                write!(f, "All player slots of this session are taken.")
            }
            RollnetError::TooManySpectators => {
                write!(f, "The maximum number of spectators has been reached.")
            }
            RollnetError::DuplicatedPlayer => {
                write!(f, "A player with this number has been added before.")
            }
            RollnetError::NotSupported => {
                write!(
                    f,
                    "This session kind does not support the requested operation."
                )
            }
            RollnetError::SpectatorTooFarBehind => {
                write!(
                    f,
                    "The spectator got so far behind the host that catching up is impossible."
                )
            }
            RollnetError::Desync { frame } => {
                write!(
                    f,
                    "Missing saved state for required rollback frame {}; the session has desynced.",
                    frame
                )
            }
            RollnetError::TransportFailure { info } => {
                write!(f, "The background transport failed: {}", info)
            }
        }
    }
}

impl Error for RollnetError {}
