//! Steps, trigger conditions and fixed-length patterns.

use alloc::vec::Vec;
use arrayvec::{ArrayString, ArrayVec};
use core::ops::Range;

use crate::params::ParamBag;

/// Longest pattern a track can hold; also the global loop length in
/// steps.
pub const MAX_PATTERN_STEPS: usize = 64;
/// Notes a single step can stack (chords on melodic tracks).
pub const MAX_STEP_NOTES: usize = 4;

/// A note name such as `"C4"`, `"F#3"` or `"Bb-1"`.
pub type NoteName = ArrayString<4>;

/// When a step fires, given the track's trigger history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrigCondition {
    /// Fire every pass.
    #[default]
    Always,
    /// Fire with probability `percent`/100, drawn per evaluation.
    Probability(u8),
    /// Fire on pass `a` of every `b` fires: `(count % b) + 1 == a`.
    /// `b == 0` is malformed and treated as [`TrigCondition::Always`].
    Cycle { a: u8, b: u8 },
    /// Fire only while the track has never fired.
    First,
    /// Fire only once the track has fired at least once.
    NotFirst,
    /// Fire iff the track last fired on the previous loop exactly.
    Pre,
    /// Negation of [`TrigCondition::Pre`].
    NotPre,
}

impl TrigCondition {
    /// Parse the editor's string form: `""`/`"always"`, `"50%"`,
    /// `"3:4"`, `"first"`, `"!first"`, `"pre"`, `"!pre"`. Anything
    /// malformed degrades to `Always`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s {
            "" | "always" => TrigCondition::Always,
            "first" => TrigCondition::First,
            "!first" => TrigCondition::NotFirst,
            "pre" => TrigCondition::Pre,
            "!pre" => TrigCondition::NotPre,
            _ => {
                if let Some(p) = s.strip_suffix('%') {
                    return match p.trim().parse::<u8>() {
                        Ok(p) => TrigCondition::Probability(p.min(100)),
                        Err(_) => TrigCondition::Always,
                    };
                }
                if let Some((a, b)) = s.split_once(':') {
                    return match (a.trim().parse::<u8>(), b.trim().parse::<u8>()) {
                        (Ok(a), Ok(b)) => TrigCondition::Cycle { a, b },
                        _ => TrigCondition::Always,
                    };
                }
                TrigCondition::Always
            }
        }
    }
}

/// One slot of a pattern.
///
/// The canonical "off" state is `active == false` with no notes; an
/// active step with no notes plays the track's default pitch (drum
/// tracks ignore pitch entirely).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Step {
    pub active: bool,
    pub notes: ArrayVec<NoteName, MAX_STEP_NOTES>,
    /// Velocity in 0..1.
    pub velocity: f32,
    /// Length in whole steps, >= 1.
    pub duration: u16,
    pub condition: TrigCondition,
    /// Per-step parameter overlay; shadows track params and strip
    /// values for this trigger only.
    pub locks: Option<ParamBag>,
}

impl Step {
    /// The empty, inactive step.
    pub fn off() -> Self {
        Self {
            active: false,
            notes: ArrayVec::new(),
            velocity: 1.0,
            duration: 1,
            condition: TrigCondition::Always,
            locks: None,
        }
    }

    /// An active step with no pitch (drum-style trigger).
    pub fn on(velocity: f32) -> Self {
        Self { active: true, velocity, ..Self::off() }
    }

    /// An active step carrying one note.
    pub fn with_note(note: &str, velocity: f32) -> Self {
        let mut step = Self::on(velocity);
        step.push_note(note);
        step
    }

    /// Add a note if it fits the name and chord caps.
    pub fn push_note(&mut self, note: &str) {
        if let Ok(name) = NoteName::from(note) {
            let _ = self.notes.try_push(name);
        }
    }

    /// Reset to the canonical off state.
    pub fn clear(&mut self) {
        *self = Step::off();
    }

    pub fn is_off(&self) -> bool {
        !self.active
    }

    /// Write one lock value, creating the overlay on first use.
    pub fn set_lock(&mut self, path: &str, value: crate::params::ParamValue) {
        self.locks.get_or_insert_with(ParamBag::new).set(path, value);
    }

    /// The step indices this step occupies when placed at `index`,
    /// for display and resize gestures. Steps never wrap a pattern
    /// cycle; the scheduler truncates at the loop boundary instead.
    pub fn span(&self, index: usize) -> Range<usize> {
        index..index + self.duration.max(1) as usize
    }
}

/// A fixed-capacity sequence of steps.
///
/// All [`MAX_PATTERN_STEPS`] slots are always allocated; `len` selects
/// the playing prefix so shrinking and re-growing a pattern is
/// lossless.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    /// Playing length in steps, 1..=[`MAX_PATTERN_STEPS`].
    pub len: usize,
    pub steps: Vec<Step>,
}

impl Pattern {
    pub fn new(len: usize) -> Self {
        Self {
            len: len.clamp(1, MAX_PATTERN_STEPS),
            steps: alloc::vec![Step::off(); MAX_PATTERN_STEPS],
        }
    }

    pub fn step(&self, index: usize) -> &Step {
        debug_assert!(index < self.len);
        &self.steps[index]
    }

    pub fn step_mut(&mut self, index: usize) -> &mut Step {
        debug_assert!(index < self.len);
        &mut self.steps[index]
    }

    /// The step a global step counter lands on, wrapping at this
    /// pattern's own length.
    pub fn wrapped(&self, global_step: u64) -> &Step {
        &self.steps[(global_step % self.len as u64) as usize]
    }

    /// Change the playing length without losing trailing steps.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.clamp(1, MAX_PATTERN_STEPS);
    }

    pub fn active_count(&self) -> usize {
        self.steps[..self.len].iter().filter(|s| s.active).count()
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    #[test]
    fn parse_basic_conditions() {
        assert_eq!(TrigCondition::parse(""), TrigCondition::Always);
        assert_eq!(TrigCondition::parse("always"), TrigCondition::Always);
        assert_eq!(TrigCondition::parse("first"), TrigCondition::First);
        assert_eq!(TrigCondition::parse("!first"), TrigCondition::NotFirst);
        assert_eq!(TrigCondition::parse("pre"), TrigCondition::Pre);
        assert_eq!(TrigCondition::parse("!pre"), TrigCondition::NotPre);
    }

    #[test]
    fn parse_probability() {
        assert_eq!(TrigCondition::parse("35%"), TrigCondition::Probability(35));
        assert_eq!(TrigCondition::parse("150%"), TrigCondition::Probability(100));
        assert_eq!(TrigCondition::parse("x%"), TrigCondition::Always);
    }

    #[test]
    fn parse_cycle() {
        assert_eq!(TrigCondition::parse("3:4"), TrigCondition::Cycle { a: 3, b: 4 });
        assert_eq!(TrigCondition::parse(" 1 : 8 "), TrigCondition::Cycle { a: 1, b: 8 });
        // Non-numeric halves degrade to always.
        assert_eq!(TrigCondition::parse("a:4"), TrigCondition::Always);
        assert_eq!(TrigCondition::parse("3:b"), TrigCondition::Always);
        // b = 0 parses; the evaluator degrades it.
        assert_eq!(TrigCondition::parse("3:0"), TrigCondition::Cycle { a: 3, b: 0 });
    }

    #[test]
    fn step_off_is_canonical() {
        let step = Step::off();
        assert!(step.is_off());
        assert!(step.notes.is_empty());
        assert_eq!(step.duration, 1);
    }

    #[test]
    fn step_span_matches_duration() {
        let mut step = Step::on(1.0);
        step.duration = 3;
        assert_eq!(step.span(5), 5..8);
        assert_eq!(step.span(5).len(), 3);
        // Re-deriving duration from the span reproduces it.
        assert_eq!(step.span(0).len() as u16, step.duration);
    }

    #[test]
    fn step_lock_created_on_demand() {
        let mut step = Step::on(0.8);
        assert!(step.locks.is_none());
        step.set_lock("filter.cutoff", ParamValue::Num(900.0));
        assert_eq!(step.locks.as_ref().unwrap().num("filter.cutoff"), Some(900.0));
    }

    #[test]
    fn pattern_resize_is_lossless() {
        let mut pattern = Pattern::new(16);
        pattern.step_mut(12).active = true;
        pattern.set_len(8);
        assert_eq!(pattern.len, 8);
        pattern.set_len(16);
        assert!(pattern.step(12).active);
    }

    #[test]
    fn pattern_wraps_at_own_length() {
        let mut pattern = Pattern::new(4);
        pattern.step_mut(1).active = true;
        assert!(pattern.wrapped(5).active);
        assert!(!pattern.wrapped(4).active);
    }

    #[test]
    fn pattern_len_clamped() {
        assert_eq!(Pattern::new(0).len, 1);
        assert_eq!(Pattern::new(200).len, MAX_PATTERN_STEPS);
    }
}
