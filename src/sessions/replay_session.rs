use crate::frame::Frame;
use crate::frame_info::ConfirmedInputs;
use crate::{Config, RollnetError, SessionHandler, SessionState};

/// A `ReplaySession` plays a recorded stream of confirmed inputs back through the same
/// session contract. There is no network and no prediction; when the stream is exhausted,
/// `synchronize_inputs` reports `NotSynchronized` and the host can stop its loop.
///
/// The input stream is typically captured with a [`ConfirmedInputSink`] during a live
/// session.
///
/// [`ConfirmedInputSink`]: crate::ConfirmedInputSink
pub struct ReplaySession<T>
where
    T: Config,
{
    inputs: Vec<ConfirmedInputs<T::Input>>,
    current_frame: Frame,
    started: bool,
}

impl<T: Config> ReplaySession<T> {
    pub fn new(inputs: Vec<ConfirmedInputs<T::Input>>) -> Self {
        Self {
            inputs,
            current_frame: Frame::NULL,
            started: false,
        }
    }

    /// First call notifies the host that playback begins; afterwards a no-op.
    pub fn begin_frame(&mut self, handler: &mut dyn SessionHandler<T>) -> Result<(), RollnetError> {
        if !self.started {
            self.started = true;
            handler.on_session_start();
        }
        Ok(())
    }

    /// The recorded inputs for the next frame.
    pub fn synchronize_inputs(&mut self) -> Result<ConfirmedInputs<T::Input>, RollnetError> {
        let frame_to_grab = self.current_frame.next();
        match self.inputs.get(frame_to_grab.number() as usize) {
            Some(inputs) => Ok(*inputs),
            None => Err(RollnetError::NotSynchronized),
        }
    }

    pub fn advance_frame(&mut self) -> Result<(), RollnetError> {
        let next = self.current_frame.next();
        if (next.number() as usize) >= self.inputs.len() {
            return Err(RollnetError::NotSynchronized);
        }
        self.current_frame = next;
        Ok(())
    }

    pub fn current_state(&self) -> SessionState {
        if self.started {
            SessionState::Running
        } else {
            SessionState::Initializing
        }
    }

    /// The frame of the most recently played-back inputs.
    pub const fn current_frame(&self) -> Frame {
        self.current_frame
    }

    /// Total number of recorded frames.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod replay_session_tests {
    use super::*;
    use crate::{InputStatus, PeerEvent, PlayerHandle};

    struct ReplayConfig;
    impl Config for ReplayConfig {
        type Input = u32;
    }

    #[derive(Default)]
    struct NullHandler {
        started: usize,
    }

    impl SessionHandler<ReplayConfig> for NullHandler {
        fn on_session_start(&mut self) {
            self.started += 1;
        }
        fn on_session_close(&mut self) {}
        fn save_state(&mut self, _frame: Frame) -> Vec<u8> {
            Vec::new()
        }
        fn load_state(&mut self, _frame: Frame, _state: &[u8]) {}
        fn advance_frame(&mut self, _inputs: &[(u32, InputStatus)]) {}
        fn time_sync(&mut self, _skip_frames: u32) {}
        fn on_peer_event(&mut self, _player: PlayerHandle, _event: PeerEvent) {}
    }

    #[test]
    fn test_replay_plays_all_frames_in_order() {
        let recorded: Vec<_> = (0..10)
            .map(|i| ConfirmedInputs::new(Frame::new(i), &[i as u32, i as u32 + 100]))
            .collect();
        let mut session = ReplaySession::<ReplayConfig>::new(recorded);
        let mut handler = NullHandler::default();

        for i in 0..10 {
            session.begin_frame(&mut handler).unwrap();
            let inputs = session.synchronize_inputs().unwrap();
            assert_eq!(inputs.frame, Frame::new(i));
            assert_eq!(inputs.inputs(), &[i as u32, i as u32 + 100]);
            session.advance_frame().unwrap();
        }
        assert_eq!(handler.started, 1);

        // the stream is exhausted
        assert_eq!(
            session.synchronize_inputs(),
            Err(RollnetError::NotSynchronized)
        );
    }
}
