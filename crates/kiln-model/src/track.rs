//! Tracks: archetype, parameters, strip settings, patterns and
//! automation.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::automation::Curve;
use crate::params::{ParamBag, ParamPath};
use crate::pattern::Pattern;

/// Stable track identity, assigned by the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u32);

/// The synthesis algorithm a track plays, or MIDI passthrough.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Archetype {
    /// Pitch-drop body plus transient click.
    #[default]
    Kick,
    /// Dual band-passed noise.
    Hat,
    /// Two operators with selectable combine mode, folded.
    Arcane,
    /// Single oscillator into a selectable distortion chain.
    Ruin,
    /// Cross-modulating pair into a dual-filter topology.
    Artifice,
    /// Wavetable oscillator with bend and twist shaping.
    Shift,
    /// Exciter into a modal resonator bank.
    Reson,
    /// Two-operator FM with modulator feedback.
    Alloy,
    /// No synthesis; steps become MIDI events on the track's channel.
    Midi,
}

impl Archetype {
    pub const ALL: [Archetype; 9] = [
        Archetype::Kick,
        Archetype::Hat,
        Archetype::Arcane,
        Archetype::Ruin,
        Archetype::Artifice,
        Archetype::Shift,
        Archetype::Reson,
        Archetype::Alloy,
        Archetype::Midi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Archetype::Kick => "kick",
            Archetype::Hat => "hat",
            Archetype::Arcane => "arcane",
            Archetype::Ruin => "ruin",
            Archetype::Artifice => "artifice",
            Archetype::Shift => "shift",
            Archetype::Reson => "reson",
            Archetype::Alloy => "alloy",
            Archetype::Midi => "midi",
        }
    }

    /// Melodic archetypes take their pitch from step notes; drum
    /// archetypes tune in Hz via the `tuning` parameter.
    pub fn is_melodic(self) -> bool {
        !matches!(self, Archetype::Kick | Archetype::Hat | Archetype::Midi)
    }

    /// Safety tail added after the envelope before a voice may be
    /// reclaimed. Resonator banks ring past their envelope.
    pub fn tail_seconds(self) -> f32 {
        match self {
            Archetype::Reson => 1.0,
            _ => 0.5,
        }
    }

    /// The parameter bag shape for this archetype, with every value at
    /// its factory default.
    pub fn default_params(self) -> ParamBag {
        let mut p = ParamBag::new();
        match self {
            Archetype::Kick => {
                p.set_num("tuning", 48.0);
                p.set_num("tone", 0.4);
                p.set_num("impact", 0.6);
                p.set_num("character", 0.3);
                p.set_num("env.attack", 0.002);
                p.set_num("env.decay", 0.35);
                p.set_num("env.sustain", 0.0);
                p.set_num("env.release", 0.12);
            }
            Archetype::Hat => {
                p.set_num("tuning", 7200.0);
                p.set_num("spread", 1.4);
                p.set_num("character", 0.5);
                p.set_num("env.attack", 0.001);
                p.set_num("env.decay", 0.06);
                p.set_num("env.sustain", 0.0);
                p.set_num("env.release", 0.04);
            }
            Archetype::Arcane => {
                p.set_choice("mode", "pm");
                p.set_num("spread", 0.01);
                p.set_num("fold", 0.2);
                p.set_num("filter.cutoff", 2400.0);
                p.set_num("filter.q", 0.8);
                p.set_num("env.attack", 0.005);
                p.set_num("env.decay", 0.3);
                p.set_num("env.sustain", 0.2);
                p.set_num("env.release", 0.25);
            }
            Archetype::Ruin => {
                p.set_choice("algo", "drive");
                p.set_num("drive", 0.5);
                p.set_num("fold", 0.3);
                p.set_num("feedback", 0.35);
                p.set_num("filter.cutoff", 1800.0);
                p.set_num("filter.q", 0.7);
                p.set_num("env.attack", 0.003);
                p.set_num("env.decay", 0.28);
                p.set_num("env.sustain", 0.15);
                p.set_num("env.release", 0.2);
            }
            Archetype::Artifice => {
                p.set_choice("topology", "parallel");
                p.set_num("fm", 0.15);
                p.set_num("noise", 0.1);
                p.set_num("spread", 0.6);
                p.set_num("filter.cutoff", 1500.0);
                p.set_num("filter.q", 0.9);
                p.set_num("filter.env", 0.5);
                p.set_num("env.attack", 0.004);
                p.set_num("env.decay", 0.32);
                p.set_num("env.sustain", 0.25);
                p.set_num("env.release", 0.3);
            }
            Archetype::Shift => {
                p.set_num("table", 0.0);
                p.set_num("bend", 0.25);
                p.set_num("twist", 0.2);
                p.set_num("filter.cutoff", 2800.0);
                p.set_num("filter.q", 1.1);
                p.set_num("env.attack", 0.004);
                p.set_num("env.decay", 0.3);
                p.set_num("env.sustain", 0.2);
                p.set_num("env.release", 0.25);
            }
            Archetype::Reson => {
                p.set_choice("exciter", "noise");
                p.set_num("structure", 0.3);
                p.set_num("material", 0.5);
                p.set_num("brightness", 3500.0);
                p.set_num("filter.cutoff", 4000.0);
                p.set_num("env.attack", 0.001);
                p.set_num("env.decay", 0.25);
                p.set_num("env.sustain", 0.0);
                p.set_num("env.release", 0.3);
            }
            Archetype::Alloy => {
                p.set_num("ratio", 2.0);
                p.set_num("depth", 1.5);
                p.set_num("feedback", 0.2);
                p.set_num("mod.decay", 0.18);
                p.set_num("env.attack", 0.003);
                p.set_num("env.decay", 0.3);
                p.set_num("env.sustain", 0.2);
                p.set_num("env.release", 0.25);
            }
            Archetype::Midi => {}
        }
        p
    }
}

/// LFO waveforms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LfoWave {
    #[default]
    Sine,
    Triangle,
    Square,
    Saw,
}

/// One of a track's two per-voice LFO slots.
///
/// LFOs are resolved at trigger time and live only as long as the
/// voice; a destination of `"none"` or zero depth attaches nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct LfoSettings {
    pub wave: LfoWave,
    /// Free rate in Hz; ignored when `sync` is set.
    pub rate_hz: f32,
    pub sync: Option<crate::tuning::SyncDivision>,
    /// Modulation depth in 0..1.
    pub depth: f32,
    /// Destination parameter path, or `"none"`.
    pub dest: ParamPath,
}

impl Default for LfoSettings {
    fn default() -> Self {
        Self {
            wave: LfoWave::Sine,
            rate_hz: 2.0,
            sync: None,
            depth: 0.0,
            dest: ParamPath::from("none").unwrap_or_default(),
        }
    }
}

/// Channel strip settings: gain staging and effect sends.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StripSettings {
    /// Linear gain, 0..1.5.
    pub volume: f32,
    /// -1 (left) .. 1 (right).
    pub pan: f32,
    pub send_reverb: f32,
    pub send_delay: f32,
    pub send_drive: f32,
    pub muted: bool,
}

impl Default for StripSettings {
    fn default() -> Self {
        Self {
            volume: 0.8,
            pan: 0.0,
            send_reverb: 0.0,
            send_delay: 0.0,
            send_drive: 0.0,
            muted: false,
        }
    }
}

/// One sequencer track.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub name: ArrayString<24>,
    pub archetype: Archetype,
    /// Parameter bag shaped by `archetype`.
    pub params: ParamBag,
    pub strip: StripSettings,
    pub lfos: [LfoSettings; 2],
    pub patterns: Vec<Pattern>,
    /// Index into `patterns` selecting the playing pattern.
    pub active_pattern: usize,
    /// Automation curves keyed by parameter path.
    pub automation: Vec<(ParamPath, Curve)>,
    /// MIDI channel 0..=15 for the `Midi` archetype. Out-of-range
    /// values cause the track's MIDI output to be dropped.
    pub midi_channel: u8,
}

impl Track {
    pub fn new(id: TrackId, archetype: Archetype) -> Self {
        let mut name = ArrayString::new();
        let _ = name.try_push_str(archetype.name());
        Self {
            id,
            name,
            archetype,
            params: archetype.default_params(),
            strip: StripSettings::default(),
            lfos: [LfoSettings::default(), LfoSettings::default()],
            patterns: alloc::vec![Pattern::default()],
            active_pattern: 0,
            automation: Vec::new(),
            midi_channel: 0,
        }
    }

    /// The playing pattern. Falls back to the first pattern if the
    /// active index is stale; `None` only for a structurally invalid
    /// track with no patterns at all, which the engine skips.
    pub fn pattern(&self) -> Option<&Pattern> {
        self.patterns
            .get(self.active_pattern)
            .or_else(|| self.patterns.first())
    }

    pub fn pattern_mut(&mut self) -> Option<&mut Pattern> {
        let idx = if self.active_pattern < self.patterns.len() {
            self.active_pattern
        } else {
            0
        };
        self.patterns.get_mut(idx)
    }

    pub fn automation_curve(&self, path: &str) -> Option<&Curve> {
        self.automation
            .iter()
            .find(|(k, _)| k.as_str() == path)
            .map(|(_, c)| c)
    }

    /// Install or replace the automation curve at `path`.
    pub fn set_automation(&mut self, path: &str, curve: Curve) {
        let key = match ParamPath::from(path) {
            Ok(k) => k,
            Err(_) => return,
        };
        if let Some(slot) = self.automation.iter_mut().find(|(k, _)| k.as_str() == path) {
            slot.1 = curve;
        } else {
            self.automation.push((key, curve));
        }
    }

    pub fn clear_automation(&mut self, path: &str) {
        self.automation.retain(|(k, _)| k.as_str() != path);
    }
}
