/// Information about the quality of a peer connection, queried per remote player via
/// `get_network_stats`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NetworkStats {
    /// The roundtrip time to the peer in milliseconds.
    pub ping: u128,
    /// Number of input frames waiting for an ack from the peer.
    pub send_queue_len: usize,
    /// Outgoing bandwidth estimate, kilobytes per second.
    pub kbps_sent: usize,
    /// Our frame lead over the peer; negative means we are behind.
    pub local_frames_ahead: i32,
    /// The frame lead the peer last reported for itself.
    pub remote_frames_ahead: i32,
}
