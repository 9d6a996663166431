use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use instant::Duration;
use serde::{Deserialize, Serialize};

/// An absolute frame number of the shared simulation.
///
/// Frames start at [`Frame::ZERO`] and increase by one per simulation step.
/// [`Frame::NULL`] is the sentinel for "no frame yet" and compares smaller
/// than every real frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Frame(i32);

impl Frame {
    /// Represents an invalid / not-yet-known frame.
    pub const NULL: Frame = Frame(-1);
    /// The first frame of every session.
    pub const ZERO: Frame = Frame(0);
    pub(crate) const MAX: Frame = Frame(i32::MAX);

    pub const fn new(number: i32) -> Self {
        Self(number)
    }

    pub const fn number(self) -> i32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 < 0
    }

    pub const fn next(self) -> Frame {
        Frame(self.0 + 1)
    }

    pub const fn previous(self) -> Frame {
        Frame(self.0 - 1)
    }

    /// Ring index for a buffer of `len` slots. Only valid for real frames.
    pub(crate) fn offset(self, len: usize) -> usize {
        assert!(self.0 >= 0);
        self.0 as usize % len
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "(null)")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Add<FrameSpan> for Frame {
    type Output = Frame;

    fn add(self, rhs: FrameSpan) -> Frame {
        Frame(self.0 + rhs.0)
    }
}

impl Sub<FrameSpan> for Frame {
    type Output = Frame;

    fn sub(self, rhs: FrameSpan) -> Frame {
        Frame(self.0 - rhs.0)
    }
}

impl Sub<Frame> for Frame {
    type Output = FrameSpan;

    fn sub(self, rhs: Frame) -> FrameSpan {
        FrameSpan(self.0 - rhs.0)
    }
}

impl Add<i32> for Frame {
    type Output = Frame;

    fn add(self, rhs: i32) -> Frame {
        Frame(self.0 + rhs)
    }
}

impl AddAssign<i32> for Frame {
    fn add_assign(&mut self, rhs: i32) {
        self.0 += rhs;
    }
}

/// A signed count of frames, the difference type of [`Frame`].
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FrameSpan(i32);

impl FrameSpan {
    pub const ZERO: FrameSpan = FrameSpan(0);

    pub const fn new(count: i32) -> Self {
        Self(count)
    }

    pub const fn count(self) -> i32 {
        self.0
    }

    /// Wall-clock time this many frames take at `fps` simulation steps per
    /// second. Negative spans map to a zero duration.
    pub fn as_duration(self, fps: usize) -> Duration {
        assert!(fps > 0);
        if self.0 <= 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.0 as u64 * 1000 / fps as u64)
    }
}

impl fmt::Display for FrameSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} frames", self.0)
    }
}

// #########
// # TESTS #
// #########
