use std::collections::VecDeque;
use std::marker::PhantomData;

use tracing::trace;

use crate::frame::Frame;
use crate::frame_info::GameInput;
use crate::network::compression::decode;
use crate::network::messages::{ConnectionStatus, Header, Input};
use crate::network::protocol::connection::Event;
use crate::network::protocol::input_buffer::FrameBytes;
use crate::Config;

#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct InboxOutcome {
    /// New frames were published; note the receive time.
    pub accepted: bool,
    /// Something in the batch warrants (re)acking our receive progress.
    pub send_ack: bool,
}

/// The receiving half of a peer connection: filters packets from stale connection
/// instances and out-of-order deliveries, decodes input batches against the previously
/// received frame and publishes one event per player per new frame, in frame order.
#[derive(Debug)]
pub(crate) struct ProtocolInbox<T>
where
    T: Config,
{
    /// The internal queues this peer's input stream feeds, in payload order.
    recv_queues: Vec<usize>,
    /// The magic of the remote connection instance; 0 until learned in the handshake.
    remote_magic: u16,
    last_sequence: Option<u16>,
    /// The newest received frame, the delta reference for the next batch.
    last_received: FrameBytes,
    /// The peer's view of every player queue, merged from its input packets.
    peer_connect_status: Vec<ConnectionStatus>,
    _config: PhantomData<fn() -> T>,
}

impl<T: Config> ProtocolInbox<T> {
    pub(crate) fn new(recv_queues: Vec<usize>, num_players: usize) -> Self {
        let input_size = std::mem::size_of::<T::Input>() * recv_queues.len();
        Self {
            recv_queues,
            remote_magic: 0,
            last_sequence: None,
            last_received: FrameBytes::blank(input_size),
            peer_connect_status: vec![ConnectionStatus::default(); num_players],
            _config: PhantomData,
        }
    }

    pub(crate) fn set_remote_magic(&mut self, magic: u16) {
        self.remote_magic = magic;
    }

    pub(crate) fn remote_magic(&self) -> u16 {
        self.remote_magic
    }

    pub(crate) fn last_recv_frame(&self) -> Frame {
        self.last_received.frame
    }

    pub(crate) fn peer_connect_status(&self, queue: usize) -> ConnectionStatus {
        self.peer_connect_status[queue]
    }

    /// Gate for every received packet: drops packets from connection instances other than
    /// the synchronized one and packets whose sequence number does not advance.
    pub(crate) fn accepts(&mut self, header: &Header) -> bool {
        if self.remote_magic != 0 && header.magic != self.remote_magic {
            trace!(magic = header.magic, "dropping packet from stale connection");
            return false;
        }

        if let Some(last) = self.last_sequence {
            // serial-number arithmetic so long sessions survive the u16 wraparound
            let advance = header.sequence.wrapping_sub(last) as i16;
            if advance <= 0 {
                trace!(sequence = header.sequence, "dropping out-of-order packet");
                return false;
            }
        }
        self.last_sequence = Some(header.sequence);
        true
    }

    /// Handles one input batch. New frames are published as [`Event::Input`] for each fed
    /// queue; duplicates from resends are dropped but re-acked so the sender's window can
    /// move forward.
    pub(crate) fn handle_input(
        &mut self,
        body: &Input,
        events: &mut VecDeque<Event<T>>,
    ) -> InboxOutcome {
        // merge the peer's connection status table into our view
        for (ours, theirs) in self
            .peer_connect_status
            .iter_mut()
            .zip(body.peer_connect_status.iter())
        {
            ours.disconnected = ours.disconnected || theirs.disconnected;
            ours.last_frame = std::cmp::max(ours.last_frame, theirs.last_frame);
        }

        let expected = if self.last_received.frame.is_null() {
            Frame::ZERO
        } else {
            self.last_received.frame.next()
        };

        // a window starting beyond the next expected frame means the peer dropped inputs
        // we never acked; the stream cannot be repaired
        assert!(
            body.start_frame <= expected,
            "input stream skipped from {} to {}",
            self.last_received.frame,
            body.start_frame
        );

        // The batch (re)starts at frames we already have, so its delta base is older than
        // our newest frame and we cannot decode the tail. Drop it and re-ack our progress;
        // the next resend will be based on the acked frame and align.
        if body.start_frame < expected {
            return InboxOutcome {
                accepted: false,
                send_ack: true,
            };
        }

        let frames = match decode(&self.last_received.bytes, &body.bytes) {
            Ok(frames) => frames,
            Err(err) => {
                trace!("dropping undecodable input batch: {}", err);
                return InboxOutcome::default();
            }
        };

        let mut accepted = false;
        for (i, bytes) in frames.into_iter().enumerate() {
            let frame = body.start_frame + i as i32;
            assert_eq!(frame, self.last_received.frame.next());

            self.publish_frame(frame, &bytes, events);
            self.last_received = FrameBytes { frame, bytes };
            accepted = true;
        }

        InboxOutcome {
            accepted,
            send_ack: accepted,
        }
    }

    fn publish_frame(&self, frame: Frame, bytes: &[u8], events: &mut VecDeque<Event<T>>) {
        let size = std::mem::size_of::<T::Input>();
        assert_eq!(bytes.len(), size * self.recv_queues.len());

        for (i, &queue) in self.recv_queues.iter().enumerate() {
            let input = bytemuck::pod_read_unaligned::<T::Input>(&bytes[i * size..(i + 1) * size]);
            events.push_back(Event::Input {
                player: queue,
                input: GameInput::new(frame, input),
            });
        }
    }
}
