use bytemuck::Zeroable;
use tracing::debug;

use crate::config::SessionConfig;
use crate::frame_info::{ConfirmedInputs, GameInput};
use crate::input_queue::InputQueue;
use crate::network::messages::ConnectionStatus;
use crate::state_store::StateStore;
use crate::{Config, Frame, InputStatus, RollnetError, SessionHandler};

/// The `Synchronizer` owns the per-player input queues, the saved-state ring and the
/// current frame. It serves synchronized (possibly predicted) inputs to the session,
/// detects mispredictions and performs the rollback: restoring an earlier snapshot through
/// the host and resimulating forward with corrected inputs.
pub(crate) struct Synchronizer<T>
where
    T: Config,
{
    num_players: usize,
    prediction_frames: usize,
    store: StateStore,
    input_queues: Vec<InputQueue<T::Input>>,
    current_frame: Frame,
    last_confirmed_frame: Frame,
    in_rollback: bool,
}

impl<T: Config> Synchronizer<T> {
    pub(crate) fn new(config: &SessionConfig) -> Self {
        let mut input_queues = Vec::with_capacity(config.num_players);
        for queue in 0..config.num_players {
            input_queues.push(InputQueue::new(queue, config.input_queue_length));
        }
        Self {
            num_players: config.num_players,
            prediction_frames: config.prediction_frames,
            store: StateStore::new(config.prediction_frames),
            input_queues,
            current_frame: Frame::ZERO,
            last_confirmed_frame: Frame::NULL,
            in_rollback: false,
        }
    }

    pub(crate) const fn current_frame(&self) -> Frame {
        self.current_frame
    }

    pub(crate) const fn in_rollback(&self) -> bool {
        self.in_rollback
    }

    pub(crate) fn set_frame_delay(&mut self, queue: usize, delay: usize) {
        self.input_queues[queue].set_frame_delay(delay);
    }

    /// Adds a local input for the current frame. Refused once the simulation ran the whole
    /// prediction window ahead of the last confirmed frame. Returns the frame the input was
    /// stored at, which differs from the current frame by the configured input delay.
    pub(crate) fn add_local_input(
        &mut self,
        queue: usize,
        input: GameInput<T::Input>,
    ) -> Result<Frame, RollnetError> {
        let frames_ahead = (self.current_frame - self.last_confirmed_frame).count();
        if self.current_frame.number() >= self.prediction_frames as i32
            && frames_ahead >= self.prediction_frames as i32
        {
            return Err(RollnetError::PredictionThreshold);
        }

        // the input must belong to the current frame, the input delay is applied by the queue
        assert_eq!(input.frame, self.current_frame);
        Ok(self.input_queues[queue].add_input(input))
    }

    /// Adds an authoritative remote input. Conditions were already checked on the remote
    /// device; mispredictions surface through the next `check_simulation`.
    pub(crate) fn add_remote_input(&mut self, queue: usize, input: GameInput<T::Input>) {
        self.input_queues[queue].add_remote_input(input);
    }

    /// Returns one input per player for the current frame, served from the queues where
    /// confirmed and predicted otherwise. Disconnected players receive a blank input.
    pub(crate) fn synchronize_inputs(
        &mut self,
        connect_status: &[ConnectionStatus],
    ) -> Vec<(T::Input, InputStatus)> {
        let mut inputs = Vec::with_capacity(self.num_players);
        for (queue, status) in connect_status.iter().enumerate() {
            if status.disconnected && status.last_frame < self.current_frame {
                inputs.push((T::Input::zeroed(), InputStatus::Disconnected));
            } else {
                let (input, input_status) = self.input_queues[queue].input(self.current_frame);
                inputs.push((input.input, input_status));
            }
        }
        inputs
    }

    /// Returns the confirmed inputs of all players for a frame every peer has confirmed.
    pub(crate) fn confirmed_inputs(
        &self,
        frame: Frame,
        connect_status: &[ConnectionStatus],
    ) -> ConfirmedInputs<T::Input> {
        let mut inputs = Vec::with_capacity(self.num_players);
        for (queue, status) in connect_status.iter().enumerate() {
            if status.disconnected && status.last_frame < frame {
                inputs.push(T::Input::zeroed());
            } else {
                inputs.push(self.input_queues[queue].confirmed_input(frame).input);
            }
        }
        ConfirmedInputs::new(frame, &inputs)
    }

    /// Raises the last confirmed frame and discards the inputs before it, keeping one frame
    /// as the rollback anchor.
    pub(crate) fn set_last_confirmed_frame(&mut self, frame: Frame) {
        // discarding past the first incorrect frame would throw away inputs the next
        // rollback still needs
        let first_incorrect = self.earliest_incorrect_frame(Frame::NULL);
        assert!(first_incorrect.is_null() || first_incorrect >= frame);

        self.last_confirmed_frame = frame;
        if self.last_confirmed_frame > Frame::ZERO {
            for queue in &mut self.input_queues {
                queue.discard_confirmed_frames(frame.previous());
            }
        }
    }

    /// Saves the state of the current frame through the host.
    pub(crate) fn save_current_state(&mut self, handler: &mut dyn SessionHandler<T>) {
        let bytes = handler.save_state(self.current_frame);
        self.store.save(self.current_frame, bytes);
    }

    /// Ends the current frame: advances the frame counter and saves the new state.
    pub(crate) fn increment_frame(&mut self, handler: &mut dyn SessionHandler<T>) {
        self.current_frame = self.current_frame.next();
        self.save_current_state(handler);
    }

    /// Restores the snapshot of `frame` through the host. A miss is the unrecoverable
    /// desync case: the session cannot repair the shared simulation anymore.
    pub(crate) fn load_frame(
        &mut self,
        frame: Frame,
        handler: &mut dyn SessionHandler<T>,
    ) -> Result<(), RollnetError> {
        assert!(!frame.is_null() && frame < self.current_frame);

        match self.store.by_frame(frame) {
            Some(saved) => {
                assert_eq!(saved.frame, frame);
                debug!(
                    frame = frame.number(),
                    checksum = saved.checksum,
                    "restoring saved state"
                );
                handler.load_state(frame, &saved.bytes);
                self.current_frame = frame;
                Ok(())
            }
            None => Err(RollnetError::Desync { frame }),
        }
    }

    /// Finds the earliest frame with incorrect inputs, merging the queues' mispredictions
    /// with a pending disconnect adjustment, and rolls the simulation back there.
    pub(crate) fn check_simulation(
        &mut self,
        disconnect_frame: Frame,
        connect_status: &[ConnectionStatus],
        handler: &mut dyn SessionHandler<T>,
    ) -> Result<(), RollnetError> {
        let first_incorrect = self.earliest_incorrect_frame(disconnect_frame);
        if first_incorrect.is_null() {
            return Ok(());
        }
        self.adjust_simulation(first_incorrect, connect_status, handler)
    }

    /// Rolls back to `seek_to` and resimulates forward to where the simulation was, feeding
    /// the host the corrected inputs (and predictions where still unconfirmed). Saves every
    /// intermediate frame again on the way.
    pub(crate) fn adjust_simulation(
        &mut self,
        seek_to: Frame,
        connect_status: &[ConnectionStatus],
        handler: &mut dyn SessionHandler<T>,
    ) -> Result<(), RollnetError> {
        // the wrong input was served for the frame we are still standing on; nothing has
        // been simulated with it yet, so dropping the predictions is all there is to do
        if seek_to == self.current_frame {
            for queue in &mut self.input_queues {
                queue.reset_prediction(seek_to);
            }
            return Ok(());
        }

        let saved_current_frame = self.current_frame;
        let rollback_span = saved_current_frame - seek_to;
        assert!(rollback_span.count() <= self.prediction_frames as i32);

        debug!(
            seek_to = seek_to.number(),
            from = saved_current_frame.number(),
            "rolling back"
        );

        self.load_frame(seek_to, handler)?;
        assert_eq!(self.current_frame, seek_to);

        for queue in &mut self.input_queues {
            queue.reset_prediction(seek_to);
        }

        self.in_rollback = true;
        while self.current_frame < saved_current_frame {
            let inputs = self.synchronize_inputs(connect_status);
            handler.advance_frame(&inputs);
            self.increment_frame(handler);
        }
        self.in_rollback = false;

        assert_eq!(self.current_frame, saved_current_frame);
        Ok(())
    }

    fn earliest_incorrect_frame(&self, disconnect_frame: Frame) -> Frame {
        let mut first_incorrect = disconnect_frame;
        for queue in &self.input_queues {
            let incorrect = queue.first_incorrect_frame();
            if !incorrect.is_null() && (first_incorrect.is_null() || incorrect < first_incorrect) {
                first_incorrect = incorrect;
            }
        }
        first_incorrect
    }
}

// #########
// # TESTS #
// #########
