use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread;

use instant::Duration;
use tracing::warn;

use crate::network::messages::Message;

const RECV_BUFFER_SIZE: usize = 4096;
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The datagram transport of a session. The session sends from the host thread while the
/// background worker blocks in `receive`, so implementations take `&self` and must be
/// shareable between the two.
///
/// Delivery is unordered and unreliable on purpose; the protocol on top resends whatever
/// matters.
pub trait NonBlockingSocket: Send + Sync + std::fmt::Debug {
    /// Sends one message without blocking. Fails with a [`WouldBlock`] kind error when the
    /// transport cannot take the datagram right now; the caller counts that as a dropped
    /// input and relies on the resend mechanism.
    ///
    /// [`WouldBlock`]: std::io::ErrorKind::WouldBlock
    fn send_to(&self, msg: &Message, addr: SocketAddr) -> std::io::Result<()>;

    /// Waits up to `timeout` for the next datagram. Returns `None` on timeout. Datagrams
    /// that do not decode to a [`Message`] are dropped silently.
    fn receive(&self, timeout: Duration) -> std::io::Result<Option<(SocketAddr, Message)>>;
}

/// A [`NonBlockingSocket`] over a UDP socket bound to a local port.
#[derive(Debug)]
pub struct UdpNonBlockingSocket {
    socket: UdpSocket,
}

impl UdpNonBlockingSocket {
    /// Binds a UDP socket on all interfaces at the given port.
    pub fn bind_to_port(port: u16) -> std::io::Result<Self> {
        assert!(port > 0);
        Self::bind(("0.0.0.0", port))
    }

    pub fn bind<A: ToSocketAddrs>(addr: A) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    /// The local address the socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl NonBlockingSocket for UdpNonBlockingSocket {
    fn send_to(&self, msg: &Message, addr: SocketAddr) -> std::io::Result<()> {
        let bytes = msg.encode();
        self.socket.send_to(&bytes, addr).map(|_| ())
    }

    fn receive(&self, timeout: Duration) -> std::io::Result<Option<(SocketAddr, Message)>> {
        let deadline = instant::Instant::now() + timeout;
        let mut buffer = [0; RECV_BUFFER_SIZE];
        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok((number_of_bytes, src_addr)) => {
                    assert!(number_of_bytes <= RECV_BUFFER_SIZE);
                    match Message::decode(&buffer[0..number_of_bytes]) {
                        Ok(msg) => return Ok(Some((src_addr, msg))),
                        Err(err) => {
                            warn!(from = %src_addr, "dropping undecodable datagram: {}", err);
                            continue;
                        }
                    }
                }
                // no datagram waiting
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => {
                    if instant::Instant::now() >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(RECV_POLL_INTERVAL);
                }
                // datagram sockets report this when a previous send got an ICMP rejection;
                // harmless for our purposes
                Err(ref err) if err.kind() == ErrorKind::ConnectionReset => continue,
                Err(err) => return Err(err),
            }
        }
    }
}
