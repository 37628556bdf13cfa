//! Song-mode arrangement: clips on a beat timeline.

use alloc::vec::Vec;

use crate::track::TrackId;

/// One placed clip: a pattern of a track, at a position, for a length.
///
/// A clip longer than its pattern loops the pattern for its duration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clip {
    pub track: TrackId,
    /// Index into the track's pattern list.
    pub pattern: usize,
    pub start_beat: f32,
    pub length_beats: f32,
}

impl Clip {
    pub fn end_beat(&self) -> f32 {
        self.start_beat + self.length_beats
    }

    pub fn contains(&self, beat: f32) -> bool {
        beat >= self.start_beat && beat < self.end_beat()
    }

    /// True if the clip overlaps the half-open beat range.
    pub fn overlaps(&self, begin: f32, end: f32) -> bool {
        self.start_beat < end && self.end_beat() > begin
    }
}

/// The arrangement timeline, kept sorted by clip start.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arrangement {
    clips: Vec<Clip>,
}

impl Arrangement {
    pub fn new() -> Self {
        Self { clips: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn push(&mut self, clip: Clip) {
        let at = self.clips.partition_point(|c| c.start_beat <= clip.start_beat);
        self.clips.insert(at, clip);
    }

    pub fn remove_track(&mut self, track: TrackId) {
        self.clips.retain(|c| c.track != track);
    }

    /// Clips overlapping the half-open beat range `begin..end`.
    pub fn overlapping(&self, begin: f32, end: f32) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(move |c| c.overlaps(begin, end))
    }

    /// End of the last clip, i.e. the arrangement's length in beats.
    pub fn end_beat(&self) -> f32 {
        self.clips.iter().map(Clip::end_beat).fold(0.0, f32::max)
    }
}
