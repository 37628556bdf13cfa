//! Three-tier parameter resolution.
//!
//! Effective values come from, in order: an automation curve registered
//! at `params.<path>`, a per-step parameter lock, then the track's own
//! parameter bag. Each tier can miss; the numeric and choice wrappers
//! apply the caller's fallback so nothing downstream ever sees a
//! missing or non-finite value.

use arrayvec::ArrayString;
use kiln_model::{ParamBag, ParamValue, Track, CHOICE_CAP, PATH_CAP};

/// Resolve `path` for a track at a playback time.
///
/// `time_seconds` is in the automation time base (seconds from loop
/// start); it converts to beats through `tempo` when sampling curves.
pub fn resolve(
    track: &Track,
    locks: Option<&ParamBag>,
    path: &str,
    time_seconds: f32,
    tempo: f32,
) -> Option<ParamValue> {
    // Automation curves shadow everything, but only carry numbers.
    let mut key = ArrayString::<{ PATH_CAP + 7 }>::new();
    if key.try_push_str("params.").is_ok() && key.try_push_str(path).is_ok() {
        if let Some(curve) = track.automation_curve(&key) {
            let tempo = if tempo > 0.0 { tempo } else { 120.0 };
            let beat = time_seconds * tempo / 60.0;
            if let Some(v) = curve.value_at(beat) {
                return Some(ParamValue::Num(v));
            }
        }
    }
    if let Some(bag) = locks {
        if let Some(v) = bag.get(path) {
            return Some(*v);
        }
    }
    track.params.get(path).copied()
}

/// Numeric resolution with a hardcoded fallback. Missing paths, choice
/// values at numeric call sites and non-finite numbers all coerce to
/// `fallback`.
pub fn resolve_num(
    track: &Track,
    locks: Option<&ParamBag>,
    path: &str,
    time_seconds: f32,
    tempo: f32,
    fallback: f32,
) -> f32 {
    match resolve(track, locks, path, time_seconds, tempo) {
        Some(ParamValue::Num(v)) if v.is_finite() => v,
        _ => fallback,
    }
}

/// Choice resolution with a fallback for missing paths and numeric
/// values.
pub fn resolve_choice(
    track: &Track,
    locks: Option<&ParamBag>,
    path: &str,
    time_seconds: f32,
    tempo: f32,
    fallback: &str,
) -> ArrayString<CHOICE_CAP> {
    match resolve(track, locks, path, time_seconds, tempo) {
        Some(ParamValue::Choice(c)) => c,
        _ => {
            let mut s = ArrayString::new();
            let _ = s.try_push_str(fallback);
            s
        }
    }
}
