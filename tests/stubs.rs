use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use rollnet::{Config, Frame, InputStatus, PeerEvent, PlayerHandle, SessionHandler};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct StubInput {
    pub inp: u32,
}

pub struct StubConfig;

impl Config for StubConfig {
    type Input = StubInput;
}

/// A tiny deterministic simulation: the state is a running mix of all player inputs.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubState {
    pub frame: i32,
    pub sum: u64,
}

impl StubState {
    fn advance(&mut self, inputs: &[(StubInput, InputStatus)]) {
        for (input, _) in inputs {
            self.sum = self
                .sum
                .wrapping_mul(31)
                .wrapping_add(input.inp as u64 + 1);
        }
        self.frame += 1;
    }
}

/// The host side used by the session tests. Records everything observable so the tests
/// can assert on callbacks, rollbacks and determinism.
#[derive(Default)]
pub struct GameStub {
    pub state: StubState,
    pub session_starts: usize,
    pub session_closes: usize,
    pub loads: usize,
    pub peer_events: Vec<(PlayerHandle, PeerEvent)>,
    pub sleeps: Vec<u32>,
    /// The state after advancing each frame, overwritten by resimulation.
    pub history: BTreeMap<i32, u64>,
}

impl GameStub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the local simulation; used for both live frames and resimulated ones.
    pub fn advance(&mut self, inputs: &[(StubInput, InputStatus)]) {
        self.state.advance(inputs);
        self.history.insert(self.state.frame, self.state.sum);
    }

    pub fn saw_event(&self, check: impl Fn(&PeerEvent) -> bool) -> bool {
        self.peer_events.iter().any(|(_, event)| check(event))
    }

    pub fn count_events(&self, check: impl Fn(&PeerEvent) -> bool) -> usize {
        self.peer_events
            .iter()
            .filter(|(_, event)| check(event))
            .count()
    }
}

impl SessionHandler<StubConfig> for GameStub {
    fn on_session_start(&mut self) {
        self.session_starts += 1;
    }

    fn on_session_close(&mut self) {
        self.session_closes += 1;
    }

    fn save_state(&mut self, frame: Frame) -> Vec<u8> {
        assert_eq!(frame.number(), self.state.frame);
        bincode::serialize(&self.state).unwrap()
    }

    fn load_state(&mut self, frame: Frame, state: &[u8]) {
        self.loads += 1;
        self.state = bincode::deserialize(state).unwrap();
        assert_eq!(frame.number(), self.state.frame);
    }

    fn advance_frame(&mut self, inputs: &[(StubInput, InputStatus)]) {
        self.advance(inputs);
    }

    fn time_sync(&mut self, skip_frames: u32) {
        self.sleeps.push(skip_frames);
    }

    fn on_peer_event(&mut self, player: PlayerHandle, event: PeerEvent) {
        self.peer_events.push((player, event));
    }
}
