use crate::Frame;

/// A rolling window of local and remote frame-advantage samples. The session asks it for a
/// sleep recommendation when the local client runs too far ahead of a peer.
#[derive(Debug, Clone)]
pub(crate) struct TimeSync {
    local: Vec<i32>,
    remote: Vec<i32>,
    min_frame_advantage: i32,
    max_frame_advantage: i32,
}

impl TimeSync {
    pub(crate) fn new(window: usize, min_frame_advantage: i32, max_frame_advantage: i32) -> Self {
        assert!(window > 0);
        Self {
            local: vec![0; window],
            remote: vec![0; window],
            min_frame_advantage,
            max_frame_advantage,
        }
    }

    /// Records the advantage pair observed while sending the input for `frame`.
    /// `local_advantage` is our frame lead over the peer, `remote_advantage` the lead the
    /// peer reported for itself in its last quality report.
    pub(crate) fn advance_frame(&mut self, frame: Frame, local_advantage: i32, remote_advantage: i32) {
        if frame.is_null() {
            return;
        }
        let pos = frame.offset(self.local.len());
        self.local[pos] = local_advantage;
        self.remote[pos] = remote_advantage;
    }

    /// The number of frames the local client should sit out to meet the peer in the middle,
    /// 0 if we are behind or the lead is within tolerance.
    pub(crate) fn recommended_sleep(&self) -> u32 {
        let local_sum: i32 = self.local.iter().sum();
        let local_avg = local_sum as f32 / self.local.len() as f32;
        let remote_sum: i32 = self.remote.iter().sum();
        let remote_avg = remote_sum as f32 / self.remote.len() as f32;

        // the peer is ahead of us, they have to do the sleeping
        if local_avg < remote_avg {
            return 0;
        }

        // meet in the middle
        let sleep_frames = ((local_avg - remote_avg) / 2.0) as i32;
        if sleep_frames <= self.min_frame_advantage {
            return 0;
        }
        sleep_frames.min(self.max_frame_advantage) as u32
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod time_sync_tests {
    use super::*;

    fn filled(local: i32, remote: i32) -> TimeSync {
        let mut time_sync = TimeSync::new(40, 2, 9);
        for i in 0..60 {
            time_sync.advance_frame(Frame::new(i), local, remote);
        }
        time_sync
    }

    #[test]
    fn test_no_advantage_means_no_sleep() {
        assert_eq!(filled(0, 0).recommended_sleep(), 0);
    }

    #[test]
    fn test_symmetric_advantage_means_no_sleep() {
        // both clients believe they are ahead by the same amount
        assert_eq!(filled(4, 4).recommended_sleep(), 0);
    }

    #[test]
    fn test_behind_means_no_sleep() {
        assert_eq!(filled(-5, 5).recommended_sleep(), 0);
    }

    #[test]
    fn test_small_lead_is_tolerated() {
        // (3 - (-3)) / 2 = 3, barely above the minimum of 2
        assert_eq!(filled(3, -3).recommended_sleep(), 3);
        assert_eq!(filled(2, -2).recommended_sleep(), 0);
    }

    #[test]
    fn test_large_lead_is_clamped() {
        assert_eq!(filled(40, -40).recommended_sleep(), 9);
    }
}
