use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::Frame;

/// The authoritative local view of one player queue's progress: the last frame we hold a
/// confirmed input for and whether the queue has been disconnected. The full table is
/// piggybacked on every outgoing `Input` packet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ConnectionStatus {
    pub disconnected: bool,
    pub last_frame: Frame,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            disconnected: false,
            last_frame: Frame::NULL,
        }
    }
}

/// Every packet starts with this header. `magic` identifies the connection instance of the
/// sender, `sequence` increases monotonically per peer; packets that do not advance the
/// sequence are dropped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub(crate) struct Header {
    pub magic: u16,
    pub sequence: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub(crate) struct SyncRequest {
    pub random_request: u32, // please reply back with this random data
    pub remote_magic: u16,
    pub remote_endpoint: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub(crate) struct SyncReply {
    pub random_reply: u32, // here's your random data back
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Input {
    pub peer_connect_status: Vec<ConnectionStatus>,
    pub disconnect_requested: bool,
    pub start_frame: Frame,
    pub ack_frame: Frame,
    /// The inputs from `start_frame` on, XOR-delta encoded against the input before
    /// `start_frame` and run-length compressed.
    pub bytes: Vec<u8>,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            peer_connect_status: Vec::new(),
            disconnect_requested: false,
            start_frame: Frame::NULL,
            ack_frame: Frame::NULL,
            bytes: Vec::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct InputAck {
    pub ack_frame: Frame,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub(crate) struct QualityReport {
    pub frame_advantage: i8, // frame advantage of the sender
    pub ping: u64,           // sender wall clock, milliseconds
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub(crate) struct QualityReply {
    pub pong: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum MessageBody {
    SyncRequest(SyncRequest),
    SyncReply(SyncReply),
    Input(Input),
    InputAck(InputAck),
    QualityReport(QualityReport),
    QualityReply(QualityReply),
    KeepAlive,
}

/// A message the [`NonBlockingSocket`] sends and receives. Implementations serialize and
/// deserialize it with [`encode`] and [`decode`] so all peers agree on the network byte
/// order.
///
/// [`NonBlockingSocket`]: crate::NonBlockingSocket
/// [`encode`]: Message::encode
/// [`decode`]: Message::decode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub(crate) header: Header,
    pub(crate) body: MessageBody,
}

impl Message {
    fn wire_options() -> impl Options {
        // numeric fields travel big-endian with fixed widths
        bincode::options().with_big_endian().with_fixint_encoding()
    }

    /// Serializes the message for the wire.
    pub fn encode(&self) -> Vec<u8> {
        Self::wire_options()
            .serialize(self)
            .expect("message serialization cannot fail")
    }

    /// Deserializes a received datagram. Garbage yields an error the caller drops silently.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        Self::wire_options().deserialize(bytes)
    }
}

// #########
// # TESTS #
// #########
