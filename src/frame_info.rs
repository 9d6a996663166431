use bytemuck::Zeroable;

use crate::{Frame, InputKind, MAX_PLAYERS};

/// The input of a single player for a single frame. `I` is the fixed-size, bit-copyable
/// input payload chosen by the host via the [`Config`] trait.
///
/// [`Config`]: crate::Config
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GameInput<I> {
    /// The frame this input belongs to. [`Frame::NULL`] marks a blank input.
    pub frame: Frame,
    /// The input payload.
    pub input: I,
}

impl<I: InputKind> GameInput<I> {
    pub(crate) fn new(frame: Frame, input: I) -> Self {
        Self { frame, input }
    }

    pub(crate) fn blank(frame: Frame) -> Self {
        Self {
            frame,
            input: I::zeroed(),
        }
    }

    /// Compares the input bits, ignoring the frame numbers.
    pub(crate) fn equal_bits(&self, other: &Self) -> bool {
        self.input == other.input
    }
}

impl<I: InputKind> Default for GameInput<I> {
    fn default() -> Self {
        Self::blank(Frame::NULL)
    }
}

/// The inputs of all players for one fully-confirmed frame. Emitted to spectators,
/// replay recordings and confirmed-input listeners only once every non-disconnected
/// player's input for the frame is known.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConfirmedInputs<I> {
    /// The frame these inputs belong to.
    pub frame: Frame,
    inputs: [I; MAX_PLAYERS],
    count: usize,
}

impl<I: InputKind> ConfirmedInputs<I> {
    pub fn new(frame: Frame, inputs: &[I]) -> Self {
        assert!(inputs.len() <= MAX_PLAYERS);
        let mut buffer = [I::zeroed(); MAX_PLAYERS];
        buffer[..inputs.len()].copy_from_slice(inputs);
        Self {
            frame,
            inputs: buffer,
            count: inputs.len(),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// One entry per player, in internal queue order.
    pub fn inputs(&self) -> &[I] {
        &self.inputs[..self.count]
    }
}

impl<I: InputKind> Default for ConfirmedInputs<I> {
    fn default() -> Self {
        Self {
            frame: Frame::NULL,
            inputs: [I::zeroed(); MAX_PLAYERS],
            count: 0,
        }
    }
}

// #########
// # TESTS #
// #########
