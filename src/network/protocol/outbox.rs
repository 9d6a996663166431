use std::net::SocketAddr;
use std::sync::Arc;

use instant::Instant;
use tracing::warn;

use crate::network::messages::{Header, Message, MessageBody};
use crate::network::socket::NonBlockingSocket;

const UDP_HEADER_SIZE: usize = 28; // Size of IP + UDP headers

/// The sending half of a peer connection: stamps outgoing bodies with the connection magic
/// and a monotonically increasing sequence number and pushes them through the shared
/// non-blocking transport. Failed sends are counted, not retried; everything that matters
/// is resent by the layers above.
#[derive(Debug)]
pub(crate) struct ProtocolOutbox {
    socket: Arc<dyn NonBlockingSocket>,
    peer_addr: SocketAddr,
    magic: u16,
    next_sequence: u16,
    packets_sent: usize,
    bytes_sent: usize,
    dropped_sends: usize,
    last_send_time: Instant,
}

impl ProtocolOutbox {
    pub(crate) fn new(socket: Arc<dyn NonBlockingSocket>, peer_addr: SocketAddr, magic: u16) -> Self {
        Self {
            socket,
            peer_addr,
            magic,
            next_sequence: 0,
            packets_sent: 0,
            bytes_sent: 0,
            dropped_sends: 0,
            last_send_time: Instant::now(),
        }
    }

    pub(crate) const fn last_send_time(&self) -> Instant {
        self.last_send_time
    }

    pub(crate) const fn bytes_sent(&self) -> usize {
        self.bytes_sent + self.packets_sent * UDP_HEADER_SIZE
    }

    /// Stamps and transmits one message. Returns `false` if the transport refused it.
    pub(crate) fn send(&mut self, body: MessageBody) -> bool {
        let header = Header {
            magic: self.magic,
            sequence: self.next_sequence,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let msg = Message { header, body };

        self.packets_sent += 1;
        self.bytes_sent += std::mem::size_of_val(&msg);
        self.last_send_time = Instant::now();

        match self.socket.send_to(&msg, self.peer_addr) {
            Ok(()) => true,
            Err(err) => {
                self.dropped_sends += 1;
                warn!(to = %self.peer_addr, "send failed: {}", err);
                false
            }
        }
    }
}
