//! Parameter automation curves.
//!
//! A curve is a sorted list of keyframes in beat time. Sampling
//! interpolates linearly between the bracketing keyframes and clamps to
//! the end values outside the curve's span.

use alloc::vec::Vec;

/// One automation keyframe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurvePoint {
    /// Position in beats from loop start.
    pub beat: f32,
    pub value: f32,
}

/// A piecewise-linear automation curve.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Curve {
    points: Vec<CurvePoint>,
}

impl Curve {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Build from unordered keyframes.
    pub fn from_points(mut points: Vec<CurvePoint>) -> Self {
        points.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Insert a keyframe, keeping beat order.
    pub fn push(&mut self, beat: f32, value: f32) {
        let at = self.points.partition_point(|p| p.beat <= beat);
        self.points.insert(at, CurvePoint { beat, value });
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Sample the curve at `beat`. `None` only when the curve has no
    /// keyframes at all.
    pub fn value_at(&self, beat: f32) -> Option<f32> {
        let pts = &self.points;
        let first = pts.first()?;
        if beat <= first.beat {
            return Some(first.value);
        }
        let last = pts[pts.len() - 1];
        if beat >= last.beat {
            return Some(last.value);
        }
        let hi = pts.partition_point(|p| p.beat <= beat);
        let a = pts[hi - 1];
        let b = pts[hi];
        let span = b.beat - a.beat;
        if span <= f32::EPSILON {
            return Some(b.value);
        }
        let t = (beat - a.beat) / span;
        Some(a.value + (b.value - a.value) * t)
    }
}
