use std::collections::VecDeque;

use crate::frame::Frame;
use crate::network::compression::encode;
use crate::network::messages::{ConnectionStatus, Input};

/// Upper bound on unacked outgoing frames. Remote players ack within the prediction
/// window, so only a spectator that stopped acking can ever fill this.
pub(crate) const MAX_PENDING_INPUTS: usize = 64;
/// 512 is the maximum safe UDP payload, minus space for the header, the connection
/// status table and the serialization overhead.
const MAX_PAYLOAD: usize = 467;

/// The raw input bytes of one frame: one player's payload on a remote-player connection,
/// the concatenated payloads of all players on a spectator connection.
#[derive(Debug, Clone)]
pub(crate) struct FrameBytes {
    pub frame: Frame,
    pub bytes: Vec<u8>,
}

impl FrameBytes {
    pub(crate) fn blank(size: usize) -> Self {
        Self {
            frame: Frame::NULL,
            bytes: vec![0; size],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Buffered,
    /// The peer has not acked for a whole window; it is beyond saving.
    Overflow,
}

/// The outgoing-input half of a peer connection: a window of pending inputs starting right
/// after the last acked frame. The entire window is (re)sent delta-encoded until an ack
/// moves the base forward.
#[derive(Debug)]
pub(crate) struct ProtocolInputBuffer {
    pending: VecDeque<FrameBytes>,
    last_acked: FrameBytes,
}

impl ProtocolInputBuffer {
    pub(crate) fn new(input_size: usize) -> Self {
        assert!(input_size > 0);
        Self {
            pending: VecDeque::with_capacity(MAX_PENDING_INPUTS),
            last_acked: FrameBytes::blank(input_size),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn push(&mut self, input: FrameBytes) -> PushOutcome {
        if let Some(newest) = self.pending.back() {
            assert_eq!(input.frame, newest.frame.next());
        } else if !self.last_acked.frame.is_null() {
            assert_eq!(input.frame, self.last_acked.frame.next());
        }

        if self.pending.len() >= MAX_PENDING_INPUTS {
            return PushOutcome::Overflow;
        }
        self.pending.push_back(input);
        PushOutcome::Buffered
    }

    /// Drops every pending frame up to and including `ack_frame`; the newest dropped frame
    /// becomes the new delta reference.
    pub(crate) fn ack(&mut self, ack_frame: Frame) {
        while let Some(input) = self.pending.front() {
            if input.frame <= ack_frame {
                self.last_acked = self.pending.pop_front().expect("front exists");
            } else {
                break;
            }
        }
    }

    /// Encodes the whole pending window into one `Input` body, or `None` while there is
    /// nothing in flight. The caller fills in its connection status and ack bookkeeping.
    pub(crate) fn make_body(
        &self,
        ack_frame: Frame,
        disconnect_requested: bool,
        connect_status: &[ConnectionStatus],
    ) -> Option<Input> {
        let first = self.pending.front()?;
        assert!(self.last_acked.frame.is_null() || self.last_acked.frame.next() == first.frame);

        let bytes = encode(&self.last_acked.bytes, self.pending.iter().map(|p| &p.bytes));
        assert!(bytes.len() <= MAX_PAYLOAD);

        Some(Input {
            peer_connect_status: connect_status.to_owned(),
            disconnect_requested,
            start_frame: first.frame,
            ack_frame,
            bytes,
        })
    }
}

// #########
// # TESTS #
// #########
