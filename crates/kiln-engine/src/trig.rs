//! Trigger condition evaluation with per-track fire history.
//!
//! Evaluation and commit are split: the scheduler first asks whether a
//! step fires, and only after the step is actually dispatched does it
//! commit the side effects (fire counter, has-fired flag, last-fired
//! loop). A failed evaluation leaves no trace.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use kiln_model::{TrackId, TrigCondition};

#[derive(Clone, Copy, Debug, Default)]
struct TrigState {
    fire_count: u32,
    has_fired: bool,
    last_fired_loop: Option<u32>,
}

pub struct TrigEngine {
    states: Vec<(TrackId, TrigState)>,
    rng: SmallRng,
}

impl TrigEngine {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            rng: SmallRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests and offline rendering.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            states: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn state(&self, track: TrackId) -> TrigState {
        self.states
            .iter()
            .find(|(id, _)| *id == track)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    fn state_mut(&mut self, track: TrackId) -> &mut TrigState {
        if let Some(i) = self.states.iter().position(|(id, _)| *id == track) {
            return &mut self.states[i].1;
        }
        self.states.push((track, TrigState::default()));
        let last = self.states.len() - 1;
        &mut self.states[last].1
    }

    /// Decide whether a step fires. Draws fresh randomness on every
    /// call, so probability steps are never cached.
    pub fn evaluate(
        &mut self,
        track: TrackId,
        condition: TrigCondition,
        loop_count: u32,
    ) -> bool {
        let state = self.state(track);
        match condition {
            TrigCondition::Always => true,
            TrigCondition::Probability(p) => {
                if p >= 100 {
                    true
                } else if p == 0 {
                    false
                } else {
                    self.rng.gen_range(0..100u8) < p
                }
            }
            // b == 0 survives parsing as the malformed marker and
            // degrades to always-fire.
            TrigCondition::Cycle { a, b } => {
                if b == 0 {
                    true
                } else {
                    (state.fire_count % b as u32) + 1 == a as u32
                }
            }
            TrigCondition::First => !state.has_fired,
            TrigCondition::NotFirst => state.has_fired,
            TrigCondition::Pre => Self::fired_previous_loop(state, loop_count),
            TrigCondition::NotPre => !Self::fired_previous_loop(state, loop_count),
        }
    }

    fn fired_previous_loop(state: TrigState, loop_count: u32) -> bool {
        loop_count > 0 && state.last_fired_loop == Some(loop_count - 1)
    }

    /// Record a successful fire for a track.
    pub fn commit_fire(&mut self, track: TrackId, loop_count: u32) {
        let state = self.state_mut(track);
        state.fire_count = state.fire_count.wrapping_add(1);
        state.has_fired = true;
        state.last_fired_loop = Some(loop_count);
    }

    /// Loop boundary: cycle counters restart, but cross-loop history
    /// (has-fired, last-fired loop) survives so `first` and `pre`
    /// still mean what they say.
    pub fn on_loop_wrap(&mut self) {
        for (_, state) in &mut self.states {
            state.fire_count = 0;
        }
    }

    /// Full clear, used on transport stop.
    pub fn reset(&mut self) {
        self.states.clear();
    }
}

impl Default for TrigEngine {
    fn default() -> Self {
        Self::new()
    }
}
