//! Named parameter bags.
//!
//! Every track carries a bag of named parameters shaped by its
//! archetype. Keys are dotted paths ("filter.cutoff", "env.decay")
//! stored flat; per-step parameter locks reuse the same bag type as an
//! overlay.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// Capacity of a parameter path in bytes.
pub const PATH_CAP: usize = 32;
/// Capacity of a choice (enum-valued) parameter in bytes.
pub const CHOICE_CAP: usize = 16;

/// A dotted parameter path, e.g. `"filter.cutoff"`.
pub type ParamPath = ArrayString<PATH_CAP>;

/// A single parameter value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    /// Numeric parameter (times in seconds, frequencies in Hz,
    /// normalized amounts in 0..1).
    Num(f32),
    /// Enum-valued parameter, e.g. an oscillator mode.
    Choice(ArrayString<CHOICE_CAP>),
}

impl ParamValue {
    /// Build a choice value, truncating to [`CHOICE_CAP`] bytes.
    pub fn choice(s: &str) -> Self {
        let mut v = ArrayString::new();
        for ch in s.chars() {
            if v.try_push(ch).is_err() {
                break;
            }
        }
        ParamValue::Choice(v)
    }

    pub fn as_num(&self) -> Option<f32> {
        match self {
            ParamValue::Num(v) => Some(*v),
            ParamValue::Choice(_) => None,
        }
    }

    pub fn as_choice(&self) -> Option<&str> {
        match self {
            ParamValue::Num(_) => None,
            ParamValue::Choice(s) => Some(s.as_str()),
        }
    }
}

/// An ordered set of named parameters.
///
/// Bags are small (a dozen or two entries) so lookup walks the list;
/// insertion order is preserved, which keeps editor display stable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamBag {
    entries: Vec<(ParamPath, ParamValue)>,
}

impl ParamBag {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by exact path.
    pub fn get(&self, path: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k.as_str() == path).map(|(_, v)| v)
    }

    /// Numeric lookup; `None` for missing paths and choice values.
    pub fn num(&self, path: &str) -> Option<f32> {
        self.get(path).and_then(ParamValue::as_num)
    }

    /// Choice lookup; `None` for missing paths and numeric values.
    pub fn choice(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(ParamValue::as_choice)
    }

    /// Insert or replace a value. Paths longer than [`PATH_CAP`] are
    /// dropped; they could never be read back.
    pub fn set(&mut self, path: &str, value: ParamValue) {
        let key = match ParamPath::from(path) {
            Ok(k) => k,
            Err(_) => return,
        };
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k.as_str() == path) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn set_num(&mut self, path: &str, value: f32) {
        self.set(path, ParamValue::Num(value));
    }

    pub fn set_choice(&mut self, path: &str, value: &str) {
        self.set(path, ParamValue::choice(value));
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.retain(|(k, _)| k.as_str() != path);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
