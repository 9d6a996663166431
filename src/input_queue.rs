use std::cmp;

use tracing::trace;

use crate::frame_info::GameInput;
use crate::{Frame, InputKind, InputStatus};

/// `InputQueue` handles the inputs of a single player, stored in a circular array keyed by
/// frame. It serves three clients: the local producer (`add_input`), the remote producer
/// (`add_remote_input`) and the synchronizer (`input`), which may be handed a prediction
/// when the real input has not arrived yet.
#[derive(Debug, Clone)]
pub(crate) struct InputQueue<I>
where
    I: InputKind,
{
    /// The queue this `InputQueue` belongs to, for tracing only.
    queue: usize,
    /// The head of the queue. The next input is written here.
    head: usize,
    /// The tail of the queue. The oldest retained input lives here.
    tail: usize,
    /// The current number of retained inputs.
    length: usize,
    /// Whether nothing has ever been added, an edge case for the first insertion.
    first_frame: bool,

    /// The last frame the producer handed in, before frame delay.
    last_user_added_frame: Frame,
    /// The last frame stored in the queue.
    last_added_frame: Frame,
    /// The first frame that is known to hold an incorrect prediction.
    first_incorrect_frame: Frame,
    /// The last frame the synchronizer requested. Nothing at or after it is discarded.
    last_requested_frame: Frame,

    /// The delay in frames applied to local inputs before insertion.
    frame_delay: usize,

    /// Our cyclic input storage.
    inputs: Vec<GameInput<I>>,
    /// The running prediction, usually a copy of the last known input.
    prediction: GameInput<I>,
}

impl<I: InputKind> InputQueue<I> {
    pub(crate) fn new(queue: usize, length: usize) -> Self {
        assert!(length > 1);
        Self {
            queue,
            head: 0,
            tail: 0,
            length: 0,
            first_frame: true,
            last_user_added_frame: Frame::NULL,
            last_added_frame: Frame::NULL,
            first_incorrect_frame: Frame::NULL,
            last_requested_frame: Frame::NULL,
            frame_delay: 0,
            inputs: vec![GameInput::blank(Frame::NULL); length],
            prediction: GameInput::blank(Frame::NULL),
        }
    }

    pub(crate) const fn first_incorrect_frame(&self) -> Frame {
        self.first_incorrect_frame
    }

    pub(crate) const fn last_added_frame(&self) -> Frame {
        self.last_added_frame
    }

    pub(crate) fn set_frame_delay(&mut self, delay: usize) {
        self.frame_delay = delay;
    }

    fn predicting(&self) -> bool {
        !self.prediction.frame.is_null()
    }

    pub(crate) fn reset_prediction(&mut self, frame: Frame) {
        assert!(self.first_incorrect_frame.is_null() || frame <= self.first_incorrect_frame);

        self.prediction.frame = Frame::NULL;
        self.first_incorrect_frame = Frame::NULL;
        self.last_requested_frame = Frame::NULL;
    }

    /// Returns the confirmed input for the requested frame. Panics if that frame is not in
    /// the queue; the caller must only ask for frames every peer has confirmed.
    pub(crate) fn confirmed_input(&self, requested_frame: Frame) -> GameInput<I> {
        let offset = requested_frame.offset(self.inputs.len());

        if self.inputs[offset].frame == requested_frame {
            return self.inputs[offset];
        }

        panic!(
            "no confirmed input for frame {} in queue {}",
            requested_frame, self.queue
        );
    }

    /// Discards confirmed frames up to the given frame. Confirmed frames are synchronized
    /// between all players, so they are not needed for rollbacks anymore.
    pub(crate) fn discard_confirmed_frames(&mut self, mut frame: Frame) {
        if self.length == 0 {
            return;
        }

        // never discard anything the synchronizer may still request again
        if !self.last_requested_frame.is_null() {
            frame = cmp::min(frame, self.last_requested_frame);
        }

        let tail_frame = self.inputs[self.tail].frame;
        if frame < tail_frame {
            return;
        }

        if frame >= self.last_added_frame {
            // keep only the most recent input as the rollback anchor
            let offset = self.length - 1;
            self.tail = (self.tail + offset) % self.inputs.len();
            self.length = 1;
        } else {
            let offset = (frame - tail_frame).count() as usize;
            self.tail = (self.tail + offset) % self.inputs.len();
            self.length -= offset;
        }
    }

    /// Returns the input of this player for the requested frame together with its status.
    /// If the frame is not in the queue yet, a prediction is returned instead.
    pub(crate) fn input(&mut self, requested_frame: Frame) -> (GameInput<I>, InputStatus) {
        // Serving inputs while a misprediction is pending would walk further down the wrong
        // timeline; the synchronizer rolls back first.
        assert!(self.first_incorrect_frame.is_null());

        // Remember the requested frame so nothing at or after it gets discarded, and so
        // `add_remote_input` knows when to leave prediction mode.
        self.last_requested_frame = requested_frame;

        assert!(self.length == 0 || requested_frame >= self.inputs[self.tail].frame);

        if !self.predicting() {
            // If the requested frame is retained, serve it straight out of the queue.
            if self.length > 0 {
                let mut offset = (requested_frame - self.inputs[self.tail].frame).count() as usize;
                if offset < self.length {
                    offset = (offset + self.tail) % self.inputs.len();
                    assert!(self.inputs[offset].frame == requested_frame);
                    return (self.inputs[offset], InputStatus::Confirmed);
                }
            }

            // The requested frame is not in the queue; enter prediction mode. Predict that
            // the player will do the same thing they did last time.
            if requested_frame == Frame::ZERO || self.last_added_frame.is_null() {
                self.prediction = GameInput::blank(Frame::NULL);
            } else {
                let previous_position = match self.head {
                    0 => self.inputs.len() - 1,
                    _ => self.head - 1,
                };
                self.prediction = self.inputs[previous_position];
            }
            self.prediction.frame = self.prediction.frame.next();
            trace!(
                queue = self.queue,
                frame = requested_frame.number(),
                "entering prediction mode"
            );
        }

        assert!(self.predicting());
        let mut prediction = self.prediction;
        prediction.frame = requested_frame;
        (prediction, InputStatus::Predicted)
    }

    /// Adds a local input to the queue, shifted forward by the frame delay. Returns the
    /// frame the input was actually stored at, or [`Frame::NULL`] if the queue refused it.
    pub(crate) fn add_input(&mut self, input: GameInput<I>) -> Frame {
        // Local inputs must be handed in sequentially, regardless of frame delay.
        assert!(
            self.last_user_added_frame.is_null()
                || input.frame == self.last_user_added_frame.next()
        );
        self.last_user_added_frame = input.frame;

        if self.length + self.frame_delay >= self.inputs.len() {
            return Frame::NULL;
        }

        let new_frame = self.advance_queue_head(input.frame);
        if !new_frame.is_null() {
            self.add_input_by_frame(input, new_frame);
        }
        new_frame
    }

    /// Adds an authoritative remote input. Frames older than the newest retained one are
    /// duplicates from a resend and dropped silently; skipping a frame forward is a
    /// protocol violation the peer must never commit.
    pub(crate) fn add_remote_input(&mut self, input: GameInput<I>) {
        if !self.last_added_frame.is_null() {
            if input.frame <= self.last_added_frame {
                trace!(
                    queue = self.queue,
                    frame = input.frame.number(),
                    "dropping duplicate remote input"
                );
                return;
            }
            assert!(
                input.frame == self.last_added_frame.next(),
                "remote input for queue {} skipped from frame {} to {}",
                self.queue,
                self.last_added_frame,
                input.frame
            );
        }
        let frame = input.frame;
        self.add_input_by_frame(input, frame);
    }

    /// Stores the input at the given frame number. If we have been predicting, compare the
    /// real input against the prediction served for this frame and remember the first
    /// mismatch for the synchronizer to roll back to.
    fn add_input_by_frame(&mut self, input: GameInput<I>, frame_number: Frame) {
        let previous_position = match self.head {
            0 => self.inputs.len() - 1,
            _ => self.head - 1,
        };

        assert!(self.last_added_frame.is_null() || frame_number == self.last_added_frame.next());
        assert!(
            self.first_frame
                || frame_number == Frame::ZERO
                || self.inputs[previous_position].frame == frame_number.previous()
        );

        self.inputs[self.head] = input;
        self.inputs[self.head].frame = frame_number;
        self.head = (self.head + 1) % self.inputs.len();
        self.length += 1;
        assert!(self.length <= self.inputs.len());
        self.first_frame = false;
        self.last_added_frame = frame_number;

        if self.predicting() {
            assert!(frame_number == self.prediction.frame);

            // Remember the first mispredicted frame so the synchronizer can rewind there.
            if self.first_incorrect_frame.is_null() && !self.prediction.equal_bits(&input) {
                trace!(
                    queue = self.queue,
                    frame = frame_number.number(),
                    "prediction was incorrect"
                );
                self.first_incorrect_frame = frame_number;
            }

            // Leave prediction mode once the real input for the last requested frame arrived
            // without any mispredictions; otherwise keep predicting the following frames.
            if self.prediction.frame == self.last_requested_frame
                && self.first_incorrect_frame.is_null()
            {
                self.prediction.frame = Frame::NULL;
            } else {
                self.prediction.frame = self.prediction.frame.next();
            }
        }
    }

    /// Advances the queue head to the next frame, replicating or dropping inputs if the
    /// frame delay changed since the last insertion.
    fn advance_queue_head(&mut self, input_frame: Frame) -> Frame {
        let mut previous_position = match self.head {
            0 => self.inputs.len() - 1,
            _ => self.head - 1,
        };

        let mut expected_frame = if self.first_frame {
            Frame::ZERO
        } else {
            self.inputs[previous_position].frame.next()
        };

        let target_frame = input_frame + self.frame_delay as i32;

        // The frame delay shrank since the last insertion; there is no room for this input.
        if expected_frame > target_frame {
            return Frame::NULL;
        }

        // The frame delay grew since the last insertion; replicate the newest input to fill
        // the gap.
        while expected_frame < target_frame {
            let input_to_replicate = self.inputs[previous_position];
            self.add_input_by_frame(input_to_replicate, expected_frame);
            expected_frame = expected_frame.next();
        }

        previous_position = match self.head {
            0 => self.inputs.len() - 1,
            _ => self.head - 1,
        };
        assert!(
            target_frame == Frame::ZERO
                || target_frame == self.inputs[previous_position].frame.next()
        );
        target_frame
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
mod input_queue_tests {
    use super::*;

    const QUEUE_LENGTH: usize = 128;

    fn input_at(frame: i32, bits: u32) -> GameInput<u32> {
        GameInput::new(Frame::new(frame), bits)
    }

    #[test]
    #[should_panic]
    fn test_add_input_wrong_frame() {
        let mut queue = InputQueue::<u32>::new(0, QUEUE_LENGTH);
        queue.add_input(input_at(0, 0)); // fine
        queue.add_input(input_at(3, 0)); // not fine
    }

    #[test]
    #[should_panic]
    fn test_add_input_twice() {
        let mut queue = InputQueue::<u32>::new(0, QUEUE_LENGTH);
        queue.add_input(input_at(0, 0)); // fine
        queue.add_input(input_at(0, 0)); // not fine
    }

    #[test]
    fn test_add_input_sequentially() {
        let mut queue = InputQueue::<u32>::new(0, QUEUE_LENGTH);
        for i in 0..10 {
            queue.add_input(input_at(i, i as u32));
            assert_eq!(queue.last_added_frame(), Frame::new(i));
            assert_eq!(queue.length, (i + 1) as usize);
            let (input, status) = queue.input(Frame::new(i));
            assert_eq!(status, InputStatus::Confirmed);
            assert_eq!(input.input, i as u32);
        }
    }

    #[test]
    fn test_delayed_inputs() {
        let mut queue = InputQueue::<u32>::new(0, QUEUE_LENGTH);
        let delay = 2;
        queue.set_frame_delay(delay);
        for i in 0..10 {
            let added_at = queue.add_input(input_at(i, i as u32));
            assert_eq!(added_at, Frame::new(i + delay as i32));
            assert_eq!(queue.last_added_frame(), Frame::new(i + delay as i32));
            let (input, _) = queue.input(Frame::new(i + delay as i32));
            assert_eq!(input.input, i as u32);
        }
    }

    #[test]
    fn test_remote_input_duplicates_are_dropped() {
        let mut queue = InputQueue::<u32>::new(1, QUEUE_LENGTH);
        queue.add_remote_input(input_at(0, 1));
        queue.add_remote_input(input_at(1, 2));
        queue.add_remote_input(input_at(1, 99)); // resent duplicate, ignored
        let (input, status) = queue.input(Frame::new(1));
        assert_eq!(status, InputStatus::Confirmed);
        assert_eq!(input.input, 2);
    }

    #[test]
    #[should_panic]
    fn test_remote_input_must_not_skip() {
        let mut queue = InputQueue::<u32>::new(1, QUEUE_LENGTH);
        queue.add_remote_input(input_at(0, 1));
        queue.add_remote_input(input_at(2, 2)); // frame 1 is missing
    }

    #[test]
    fn test_prediction_repeats_last_input() {
        let mut queue = InputQueue::<u32>::new(1, QUEUE_LENGTH);
        queue.add_remote_input(input_at(0, 17));
        let (predicted, status) = queue.input(Frame::new(3));
        assert_eq!(status, InputStatus::Predicted);
        assert_eq!(predicted.frame, Frame::new(3));
        assert_eq!(predicted.input, 17);
    }

    #[test]
    fn test_correct_prediction_leaves_prediction_mode() {
        let mut queue = InputQueue::<u32>::new(1, QUEUE_LENGTH);
        queue.add_remote_input(input_at(0, 17));
        let _ = queue.input(Frame::new(1)); // predicted as 17
        queue.add_remote_input(input_at(1, 17)); // prediction was right
        assert!(queue.first_incorrect_frame().is_null());
        assert!(!queue.predicting());
    }

    #[test]
    fn test_incorrect_prediction_is_detected() {
        let mut queue = InputQueue::<u32>::new(1, QUEUE_LENGTH);
        queue.add_remote_input(input_at(0, 17));
        let _ = queue.input(Frame::new(1));
        let _ = queue.input(Frame::new(2));
        queue.add_remote_input(input_at(1, 17)); // correct
        queue.add_remote_input(input_at(2, 23)); // incorrect
        assert_eq!(queue.first_incorrect_frame(), Frame::new(2));

        queue.reset_prediction(Frame::new(2));
        assert!(queue.first_incorrect_frame().is_null());
        let (input, status) = queue.input(Frame::new(2));
        assert_eq!(status, InputStatus::Confirmed);
        assert_eq!(input.input, 23);
    }

    #[test]
    fn test_discard_keeps_requested_frames() {
        let mut queue = InputQueue::<u32>::new(0, QUEUE_LENGTH);
        for i in 0..10 {
            queue.add_input(input_at(i, i as u32));
        }
        let _ = queue.input(Frame::new(5));
        queue.discard_confirmed_frames(Frame::new(9));
        // everything from the last requested frame onward must survive
        let (input, status) = queue.input(Frame::new(5));
        assert_eq!(status, InputStatus::Confirmed);
        assert_eq!(input.input, 5);
    }
}
