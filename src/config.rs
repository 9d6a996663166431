use instant::Duration;

use crate::MAX_PLAYERS;

/// All tuning knobs of a session, captured in one options value handed to the session
/// constructor. The defaults suit a 60 Hz simulation over the open internet.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of contributing players, at most [`MAX_PLAYERS`].
    pub num_players: usize,
    /// Expected simulation update rate, used for frame-advantage estimation.
    pub fps: usize,
    /// How many frames the simulation may run ahead of the last confirmed frame.
    pub prediction_frames: usize,
    /// Capacity of the per-player input rings.
    pub input_queue_length: usize,
    /// Frames of delay applied to local inputs before insertion.
    pub frame_delay: usize,
    /// Handshake roundtrips required before a connection counts as synchronized.
    pub sync_packets: u32,
    /// A keep-alive is sent if nothing else went out for this long.
    pub keep_alive_interval: Duration,
    /// Cadence of quality reports carrying ping and frame advantage.
    pub quality_report_interval: Duration,
    /// Inactivity span after which `NetworkInterrupted` is raised.
    pub disconnect_notify_start: Duration,
    /// Inactivity span after which a peer is disconnected.
    pub disconnect_timeout: Duration,
    /// Minimum number of frames between two `time_sync` recommendations.
    pub recommendation_interval: i32,
    /// Number of frame-advantage samples in the rolling TimeSync window.
    pub time_sync_window: usize,
    /// Advantages at or below this many frames never trigger a sleep recommendation.
    pub min_frame_advantage: i32,
    /// Sleep recommendations are clamped to this many frames.
    pub max_frame_advantage: i32,
    /// A spectator lagging more than this many frames starts catching up.
    pub max_frames_behind: usize,
    /// Frames a lagging spectator advances per tick while catching up.
    pub catchup_speed: usize,
    /// Restores the source-compatible confirmed-frame shortcut for two-player sessions.
    /// By default the N-player agreement path is used uniformly.
    pub two_player_confirm_shortcut: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_players: 2,
            fps: 60,
            prediction_frames: 8,
            input_queue_length: 128,
            frame_delay: 2,
            sync_packets: 5,
            keep_alive_interval: Duration::from_millis(200),
            quality_report_interval: Duration::from_millis(1000),
            disconnect_notify_start: Duration::from_millis(750),
            disconnect_timeout: Duration::from_millis(5000),
            recommendation_interval: 240,
            time_sync_window: 40,
            min_frame_advantage: 2,
            max_frame_advantage: 9,
            max_frames_behind: 10,
            catchup_speed: 2,
            two_player_confirm_shortcut: false,
        }
    }
}

impl SessionConfig {
    /// A default configuration for `num_players` players.
    pub fn with_players(num_players: usize) -> Self {
        Self {
            num_players,
            ..Self::default()
        }
    }

    /// Validates the configuration. Violations are programmer errors and fail fatally.
    pub(crate) fn assert_valid(&self) {
        assert!(self.num_players > 0, "at least one player is required");
        assert!(
            self.num_players <= MAX_PLAYERS,
            "num_players exceeds MAX_PLAYERS"
        );
        assert!(self.fps > 0, "fps must be positive");
        assert!(self.prediction_frames > 0, "prediction window must be positive");
        assert!(
            self.prediction_frames + 2 < self.input_queue_length,
            "input queue too short for the prediction window"
        );
        assert!(self.sync_packets > 0, "at least one sync roundtrip is required");
        assert!(
            self.disconnect_notify_start < self.disconnect_timeout,
            "notify threshold must precede the disconnect timeout"
        );
        assert!(self.catchup_speed >= 1, "catchup speed must be at least 1");
    }
}
