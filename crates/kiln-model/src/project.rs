//! The top-level project: tracks, tempo, arrangement and bus
//! configuration.

use alloc::vec::Vec;

use crate::arrangement::Arrangement;
use crate::pattern::{Step, TrigCondition};
use crate::track::{Archetype, Track, TrackId};
use crate::tuning::SyncDivision;

/// Reverb bus settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReverbConfig {
    /// Decay time in seconds.
    pub decay: f32,
    /// Wet amount in 0..1.
    pub mix: f32,
    /// Free pre-delay in seconds; ignored when `pre_delay_sync` is set.
    pub pre_delay: f32,
    pub pre_delay_sync: Option<SyncDivision>,
    /// High-frequency damping in 0..1.
    pub damping: f32,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            decay: 2.2,
            mix: 0.25,
            pre_delay: 0.02,
            pre_delay_sync: None,
            damping: 0.4,
        }
    }
}

/// Delay bus settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DelayConfig {
    /// Free delay time in seconds; ignored when `sync` is set.
    pub time: f32,
    pub sync: Option<SyncDivision>,
    /// Feedback in 0..0.95.
    pub feedback: f32,
    /// Feedback-loop tone, 0 dark .. 1 open.
    pub tone: f32,
    pub ping_pong: bool,
    pub mix: f32,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            time: 0.3,
            sync: Some(SyncDivision::DottedEighth),
            feedback: 0.45,
            tone: 0.5,
            ping_pong: true,
            mix: 0.3,
        }
    }
}

/// Drive bus settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveConfig {
    /// Saturation amount in 0..1.
    pub amount: f32,
    /// Post-shaper tone, 0 dark .. 1 open.
    pub tone: f32,
    pub mix: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self { amount: 0.35, tone: 0.6, mix: 0.4 }
    }
}

/// The two master "character" shaping curves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum CharacterMode {
    /// Rounded, tape-like saturation with a little asymmetry.
    #[default]
    Tape,
    /// Upward-expanding curve that hardens transients.
    Grit,
}

/// Master character insert settings.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CharacterConfig {
    pub mode: CharacterMode,
    /// Amount in 0..1; 0 bypasses the insert.
    pub amount: f32,
}

/// Master compressor settings. Also the source of sidechain duck
/// depth: a trigger from the designated source track ducks by an
/// amount derived from `threshold_db` and `ratio` scaled by the step's
/// velocity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressorConfig {
    pub threshold_db: f32,
    pub ratio: f32,
    /// Attack in seconds.
    pub attack: f32,
    /// Release in seconds.
    pub release: f32,
    pub makeup_db: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 4.0,
            attack: 0.01,
            release: 0.18,
            makeup_db: 3.0,
        }
    }
}

/// Master filter: one knob sweeping lowpass through open to highpass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MasterFilterConfig {
    /// -1..0 closes a lowpass, 0..1 raises a highpass; a small dead
    /// band around 0 bypasses the filter entirely.
    pub position: f32,
    pub q: f32,
}

impl Default for MasterFilterConfig {
    fn default() -> Self {
        Self { position: 0.0, q: 0.9 }
    }
}

/// A complete project: everything the engine needs to play.
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub tempo: f32,
    /// Swing amount in 0..0.6 of a step, applied to odd sixteenths.
    pub swing: f32,
    pub tracks: Vec<Track>,
    pub arrangement: Arrangement,
    pub reverb: ReverbConfig,
    pub delay: DelayConfig,
    pub drive: DriveConfig,
    pub character: CharacterConfig,
    pub compressor: CompressorConfig,
    pub master_filter: MasterFilterConfig,
    /// Master volume, linear 0..1.5.
    pub master_volume: f32,
    /// Track whose triggers duck the master bus, if any.
    pub sidechain_source: Option<TrackId>,
    /// Soloed track; overrides per-track mutes while set.
    pub solo: Option<TrackId>,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            tempo: 128.0,
            swing: 0.0,
            tracks: Vec::new(),
            arrangement: Arrangement::new(),
            reverb: ReverbConfig::default(),
            delay: DelayConfig::default(),
            drive: DriveConfig::default(),
            character: CharacterConfig::default(),
            compressor: CompressorConfig::default(),
            master_filter: MasterFilterConfig::default(),
            master_volume: 0.9,
            sidechain_source: None,
            solo: None,
        }
    }
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// Next unused track id.
    pub fn next_track_id(&self) -> TrackId {
        TrackId(self.tracks.iter().map(|t| t.id.0 + 1).max().unwrap_or(0))
    }

    /// A small four-track techno loop used by the demo binary, the
    /// benches and the integration tests.
    pub fn demo() -> Self {
        let mut project = Project::new();
        project.tempo = 132.0;
        project.swing = 0.08;

        // Kick on the floor, sidechain source.
        let mut kick = Track::new(TrackId(0), Archetype::Kick);
        kick.strip.volume = 0.9;
        if let Some(p) = kick.pattern_mut() {
            for i in [0, 4, 8, 12] {
                *p.step_mut(i) = Step::on(1.0);
            }
        }
        project.sidechain_source = Some(kick.id);

        // Offbeat hat with a ghost.
        let mut hat = Track::new(TrackId(1), Archetype::Hat);
        hat.strip.volume = 0.55;
        hat.strip.send_reverb = 0.15;
        if let Some(p) = hat.pattern_mut() {
            for i in [2, 6, 10, 14] {
                *p.step_mut(i) = Step::on(0.8);
            }
            *p.step_mut(15) = Step::on(0.4);
            p.step_mut(15).condition = TrigCondition::Probability(40);
        }

        // Rolling FM bassline.
        let mut bass = Track::new(TrackId(2), Archetype::Alloy);
        bass.strip.volume = 0.7;
        bass.strip.send_delay = 0.1;
        if let Some(p) = bass.pattern_mut() {
            for (i, note) in [(0, "A1"), (3, "A1"), (6, "C2"), (10, "A1"), (13, "G1")] {
                *p.step_mut(i) = Step::with_note(note, 0.85);
            }
        }

        // Sparse resonant perc, every other pass.
        let mut perc = Track::new(TrackId(3), Archetype::Reson);
        perc.strip.volume = 0.5;
        perc.strip.send_reverb = 0.35;
        if let Some(p) = perc.pattern_mut() {
            *p.step_mut(7) = Step::with_note("D4", 0.7);
            p.step_mut(7).condition = TrigCondition::Cycle { a: 2, b: 2 };
            *p.step_mut(11) = Step::with_note("A3", 0.6);
        }

        project.tracks = alloc::vec![kick, hat, bass, perc];
        project
    }
}
