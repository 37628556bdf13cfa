//! Voice construction: one module per archetype.
//!
//! Builders are pure given their inputs. Each resolves its parameters
//! through the three-tier resolver, assembles a [`VoiceGraph`], and
//! reports how long the voice needs before the pool may reclaim it.
//! The `Midi` archetype builds nothing here; its steps go out the MIDI
//! queue instead.

mod alloy;
mod arcane;
mod artifice;
mod hat;
mod kick;
mod reson;
mod ruin;
mod shift;

use arrayvec::{ArrayString, ArrayVec};

use kiln_model::{Archetype, ParamBag, Track, CHOICE_CAP};

use crate::dsp::{DspNode, LfoParam, LfoRoute, VoiceGraph};
use crate::envelope::EnvSpec;
use crate::resolver::{resolve_choice, resolve_num};
use crate::shapes::ShapeCache;

/// Modulation destinations an archetype exposes beyond the built-in
/// `volume` and `pan`: destination path, node, target, scale.
pub(crate) type LfoDests = ArrayVec<(&'static str, u8, LfoParam, f32), 4>;

/// Everything a builder needs to resolve parameters and size stages.
pub struct BuildCtx<'a> {
    pub track: &'a Track,
    pub locks: Option<&'a ParamBag>,
    /// Automation time base, seconds from loop start.
    pub loop_time: f32,
    pub tempo: f32,
    pub sample_rate: f32,
    /// Note frequency in Hz; drum archetypes ignore it.
    pub note_freq: f32,
    pub velocity: f32,
    /// Seed for any noise sources, so renders are reproducible.
    pub noise_seed: u64,
}

impl BuildCtx<'_> {
    pub fn num(&self, path: &str, fallback: f32) -> f32 {
        resolve_num(self.track, self.locks, path, self.loop_time, self.tempo, fallback)
    }

    pub fn choice(&self, path: &str, fallback: &str) -> ArrayString<CHOICE_CAP> {
        resolve_choice(self.track, self.locks, path, self.loop_time, self.tempo, fallback)
    }

    /// The step's effective amplitude envelope.
    pub fn env_spec(&self) -> EnvSpec {
        EnvSpec::new(
            self.num("env.attack", 0.005),
            self.num("env.decay", 0.3),
            self.num("env.sustain", 0.0),
            self.num("env.release", 0.2),
        )
    }
}

/// A finished voice graph plus its reclaim horizon.
pub struct BuiltVoice {
    pub graph: VoiceGraph,
    /// Seconds after the trigger at which the voice is provably
    /// silent: envelope gesture plus the archetype's safety tail.
    pub stop_seconds: f32,
}

/// Build a voice for one triggered step.
///
/// Returns `None` for the MIDI passthrough archetype, which produces
/// wire bytes rather than a graph.
pub fn build_voice(
    archetype: Archetype,
    ctx: &BuildCtx,
    shapes: &mut ShapeCache,
) -> Option<BuiltVoice> {
    let (mut graph, dests) = match archetype {
        Archetype::Kick => kick::build(ctx, shapes),
        Archetype::Hat => hat::build(ctx, shapes),
        Archetype::Arcane => arcane::build(ctx, shapes),
        Archetype::Ruin => ruin::build(ctx, shapes),
        Archetype::Artifice => artifice::build(ctx, shapes),
        Archetype::Shift => shift::build(ctx, shapes),
        Archetype::Reson => reson::build(ctx, shapes),
        Archetype::Alloy => alloy::build(ctx, shapes),
        Archetype::Midi => return None,
    };
    let velocity = if ctx.velocity.is_finite() {
        ctx.velocity.clamp(0.0, 1.0)
    } else {
        1.0
    };
    graph.set_gain(velocity);
    attach_lfos(&mut graph, ctx, &dests);
    let stop_seconds = ctx.env_spec().gesture_seconds() + archetype.tail_seconds();
    Some(BuiltVoice { graph, stop_seconds })
}

/// Wire the track's two LFO slots into the graph.
///
/// `volume` and `pan` are valid destinations for every archetype; the
/// builder's table adds the rest. Zero depth, `"none"`, and unknown
/// destinations attach nothing.
fn attach_lfos(graph: &mut VoiceGraph, ctx: &BuildCtx, dests: &LfoDests) {
    for lfo in &ctx.track.lfos {
        if lfo.depth <= 0.0 || lfo.dest.as_str() == "none" {
            continue;
        }
        let rate = match lfo.sync {
            Some(div) => {
                let secs = div.seconds(ctx.tempo);
                if secs > 0.0 {
                    1.0 / secs
                } else {
                    lfo.rate_hz
                }
            }
            None => lfo.rate_hz,
        };
        let mut targets = ArrayVec::<(u8, LfoParam, f32), 2>::new();
        match lfo.dest.as_str() {
            "volume" => targets.push((0, LfoParam::Gain, 1.0)),
            "pan" => targets.push((0, LfoParam::Pan, 1.0)),
            dest => {
                for &(name, node, param, scale) in dests {
                    if name == dest {
                        let _ = targets.try_push((node, param, scale));
                    }
                }
            }
        }
        if targets.is_empty() {
            continue;
        }
        let lfo_node = graph.push(DspNode::Lfo {
            wave: lfo.wave,
            rate: rate.clamp(0.01, 80.0),
            depth: lfo.depth.clamp(0.0, 1.0),
            phase: 0.0,
        });
        for (node, param, scale) in targets {
            graph.add_route(LfoRoute { lfo: lfo_node, node, param, scale });
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use kiln_model::{LfoWave, TrackId};

    #[test]
    fn every_archetype_builds_and_sounds() {
        let all = [
            Archetype::Kick,
            Archetype::Hat,
            Archetype::Arcane,
            Archetype::Ruin,
            Archetype::Artifice,
            Archetype::Shift,
            Archetype::Reson,
            Archetype::Alloy,
        ];
        let mut shapes = ShapeCache::new();
        for arch in all {
            let track = Track::new(TrackId(0), arch);
            let ctx = ctx_for(&track);
            let mut built = build_voice(arch, &ctx, &mut shapes)
                .unwrap_or_else(|| panic!("{:?} built no voice", arch));
            assert!(built.graph.len() <= crate::dsp::MAX_NODES);
            let peak = render_peak(&mut built);
            assert!(peak > 1e-3, "{:?} rendered silence (peak {})", arch, peak);
            assert!(peak <= 2.0, "{:?} rendered too hot (peak {})", arch, peak);
        }
    }

    #[test]
    fn midi_archetype_builds_no_voice() {
        let track = Track::new(TrackId(0), Archetype::Midi);
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        assert!(build_voice(Archetype::Midi, &ctx, &mut shapes).is_none());
    }

    #[test]
    fn stop_time_covers_envelope_and_tail() {
        let track = Track::new(TrackId(0), Archetype::Reson);
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        let built = build_voice(Archetype::Reson, &ctx, &mut shapes);
        let built = match built {
            Some(b) => b,
            None => panic!("reson built no voice"),
        };
        let spec = ctx.env_spec();
        assert!((built.stop_seconds - (spec.gesture_seconds() + 1.0)).abs() < 1e-6);
    }

    #[test]
    fn velocity_scales_output() {
        let track = Track::new(TrackId(0), Archetype::Kick);
        let mut shapes = ShapeCache::new();
        let mut loud_ctx = ctx_for(&track);
        loud_ctx.velocity = 1.0;
        let mut soft_ctx = ctx_for(&track);
        soft_ctx.velocity = 0.25;
        let mut loud = build_voice(Archetype::Kick, &loud_ctx, &mut shapes);
        let mut soft = build_voice(Archetype::Kick, &soft_ctx, &mut shapes);
        match (&mut loud, &mut soft) {
            (Some(l), Some(s)) => {
                let lp = render_peak(l);
                let sp = render_peak(s);
                assert!(lp > sp * 2.0, "loud {} soft {}", lp, sp);
            }
            _ => panic!("kick built no voice"),
        }
    }

    #[test]
    fn zero_depth_lfo_attaches_nothing() {
        let mut track = Track::new(TrackId(0), Archetype::Arcane);
        track.lfos[0].depth = 0.0;
        track.lfos[0].dest = kiln_model::ParamPath::from("volume").unwrap_or_default();
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        let with_dead_lfo = build_voice(Archetype::Arcane, &ctx, &mut shapes)
            .map(|b| b.graph.len());
        let plain_track = Track::new(TrackId(0), Archetype::Arcane);
        let plain_ctx = ctx_for(&plain_track);
        let plain = build_voice(Archetype::Arcane, &plain_ctx, &mut shapes)
            .map(|b| b.graph.len());
        assert_eq!(with_dead_lfo, plain);
    }

    #[test]
    fn unknown_lfo_dest_attaches_nothing() {
        let mut track = Track::new(TrackId(0), Archetype::Kick);
        track.lfos[0].depth = 0.5;
        track.lfos[0].dest = kiln_model::ParamPath::from("warp.amount").unwrap_or_default();
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        let modded = build_voice(Archetype::Kick, &ctx, &mut shapes).map(|b| b.graph.len());
        let plain_track = Track::new(TrackId(0), Archetype::Kick);
        let plain_ctx = ctx_for(&plain_track);
        let plain = build_voice(Archetype::Kick, &plain_ctx, &mut shapes).map(|b| b.graph.len());
        assert_eq!(modded, plain);
    }

    #[test]
    fn synced_lfo_rate_follows_tempo() {
        // A volume LFO synced to quarter notes at 120 BPM swings at
        // 2Hz; the voice count should still be one graph either way.
        let mut track = Track::new(TrackId(0), Archetype::Alloy);
        track.lfos[0].depth = 0.8;
        track.lfos[0].wave = LfoWave::Sine;
        track.lfos[0].sync = Some(kiln_model::SyncDivision::Quarter);
        track.lfos[0].dest = kiln_model::ParamPath::from("volume").unwrap_or_default();
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        let built = build_voice(Archetype::Alloy, &ctx, &mut shapes);
        assert!(built.is_some());
    }
}
