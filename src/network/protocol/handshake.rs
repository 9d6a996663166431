use std::collections::HashSet;

use instant::{Duration, Instant};

use crate::network::messages::{SyncReply, SyncRequest};

/// Outcome of feeding a received `SyncReply` into the handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum HandshakeEvent {
    /// The reply did not answer any outstanding request; ignore it.
    Stale,
    /// One roundtrip done, more to go.
    Progress {
        total: u32,
        count: u32,
        first_reply: bool,
    },
    /// All roundtrips done; the connection is synchronized.
    Finished { ping: u128, first_reply: bool },
}

/// The handshake half of a peer connection. Both sides fire `SyncRequest`s carrying random
/// nonces until the configured number of roundtrips completed; a reply only counts if it
/// echoes a nonce that is actually outstanding.
#[derive(Debug)]
pub(crate) struct ProtocolSynchronizer {
    total_roundtrips: u32,
    remaining_roundtrips: u32,
    pending_requests: HashSet<u32>,
    reply_seen: bool,
    timeout: Duration,
    started_at: Instant,
    last_request_at: Instant,
}

impl ProtocolSynchronizer {
    pub(crate) fn new(sync_packets: u32, timeout: Duration) -> Self {
        Self {
            total_roundtrips: sync_packets,
            remaining_roundtrips: sync_packets,
            pending_requests: HashSet::new(),
            reply_seen: false,
            timeout,
            started_at: Instant::now(),
            last_request_at: Instant::now(),
        }
    }

    pub(crate) fn begin(&mut self) {
        self.remaining_roundtrips = self.total_roundtrips;
        self.pending_requests.clear();
        self.reply_seen = false;
        self.started_at = Instant::now();
    }

    /// Creates the next request to fire at the peer. Re-invoked on the retry interval
    /// until a matching reply arrives.
    pub(crate) fn next_request(&mut self, remote_magic: u16, remote_endpoint: u8) -> SyncRequest {
        let random_request = rand::random::<u32>();
        self.pending_requests.insert(random_request);
        self.last_request_at = Instant::now();
        SyncRequest {
            random_request,
            remote_magic,
            remote_endpoint,
        }
    }

    pub(crate) fn handle_reply(&mut self, reply: SyncReply) -> HandshakeEvent {
        if !self.pending_requests.remove(&reply.random_reply) {
            return HandshakeEvent::Stale;
        }

        let first_reply = !self.reply_seen;
        self.reply_seen = true;

        self.remaining_roundtrips -= 1;
        if self.remaining_roundtrips > 0 {
            HandshakeEvent::Progress {
                total: self.total_roundtrips,
                count: self.total_roundtrips - self.remaining_roundtrips,
                first_reply,
            }
        } else {
            HandshakeEvent::Finished {
                ping: self.last_request_at.elapsed().as_millis(),
                first_reply,
            }
        }
    }

    /// Whether the handshake has been running longer than the configured limit.
    pub(crate) fn timed_out(&self) -> bool {
        self.started_at.elapsed() > self.timeout
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod handshake_tests {
    use super::*;

    #[test]
    fn test_handshake_counts_roundtrips() {
        let mut handshake = ProtocolSynchronizer::new(3, Duration::from_millis(5000));
        handshake.begin();

        for roundtrip in 1..=3u32 {
            let request = handshake.next_request(0, 0);
            let event = handshake.handle_reply(SyncReply {
                random_reply: request.random_request,
            });
            match event {
                HandshakeEvent::Progress {
                    total,
                    count,
                    first_reply,
                } => {
                    assert_eq!(total, 3);
                    assert_eq!(count, roundtrip);
                    assert_eq!(first_reply, roundtrip == 1);
                }
                HandshakeEvent::Finished { first_reply, .. } => {
                    assert_eq!(roundtrip, 3);
                    assert!(!first_reply);
                }
                HandshakeEvent::Stale => panic!("reply should have matched"),
            }
        }
    }

    #[test]
    fn test_unknown_nonce_is_stale() {
        let mut handshake = ProtocolSynchronizer::new(5, Duration::from_millis(5000));
        handshake.begin();
        let _ = handshake.next_request(0, 0);
        assert_eq!(
            handshake.handle_reply(SyncReply { random_reply: 1 }),
            HandshakeEvent::Stale
        );
    }
}
