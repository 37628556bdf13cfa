//! Two-operator FM with modulator feedback.

use crate::dsp::{DspNode, LfoParam, OscShape, VoiceGraph};
use crate::envelope::{EnvSpec, GainEnv};
use crate::shapes::ShapeCache;

use super::{BuildCtx, LfoDests};

pub(super) fn build(ctx: &BuildCtx, _shapes: &mut ShapeCache) -> (VoiceGraph, LfoDests) {
    let sr = ctx.sample_rate;
    let freq = ctx.note_freq.clamp(8.0, 8000.0);
    let ratio = ctx.num("ratio", 2.0).clamp(0.0, 16.0);
    let depth = ctx.num("depth", 1.5).clamp(0.0, 8.0);
    let feedback = ctx.num("feedback", 0.2).clamp(0.0, 1.0);
    let mod_decay = ctx.num("mod.decay", 0.18).max(0.005);
    let spec = ctx.env_spec();

    let mut g = VoiceGraph::new(sr);

    // The modulator phase-modulates itself (it reads its own output
    // one sample late) and decays on its own clock, independent of
    // the carrier's amplitude envelope.
    let modulator = g.push(
        DspNode::osc(OscShape::Sine, freq)
            .with_ratio(ratio)
            .with_pm(0, feedback * 0.8),
    );
    debug_assert_eq!(modulator, 0);
    let mod_env = g.push(DspNode::Env {
        input: modulator,
        env: GainEnv::new(EnvSpec::new(0.0, mod_decay, 0.0, mod_decay), sr),
    });
    let carrier = g.push(
        DspNode::osc(OscShape::Sine, freq).with_pm(mod_env, depth * 0.15),
    );
    let amp = g.push(DspNode::Env {
        input: carrier,
        env: GainEnv::new(spec, sr),
    });
    g.set_out(amp);

    let mut dests = LfoDests::new();
    dests.push(("depth", carrier, LfoParam::Depth, 1.0));
    dests.push(("pitch", carrier, LfoParam::Freq, 0.5));
    (g, dests)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use kiln_model::{Archetype, Track, TrackId};

    fn spectrum_spread(depth: f32) -> f32 {
        let mut track = Track::new(TrackId(0), Archetype::Alloy);
        track.params.set_num("depth", depth);
        track.params.set_num("env.sustain", 1.0);
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        let (mut g, _) = build(&ctx, &mut shapes);
        // First difference energy is a cheap brightness proxy: FM
        // sidebands raise it, a bare sine keeps it low.
        let mut last = 0.0f32;
        let mut diff = 0.0f32;
        for _ in 0..(0.25 * SR) as usize {
            let s = g.render();
            assert!(s.is_finite());
            diff += (s - last) * (s - last);
            last = s;
        }
        diff
    }

    #[test]
    fn depth_brightens_the_carrier() {
        assert!(spectrum_spread(6.0) > spectrum_spread(0.0) * 1.2);
    }

    #[test]
    fn modulator_envelope_tames_the_tail() {
        // With a very short modulator decay the late portion should
        // be nearly pure carrier regardless of FM depth.
        let mut track = Track::new(TrackId(0), Archetype::Alloy);
        track.params.set_num("mod.decay", 0.01);
        track.params.set_num("depth", 6.0);
        track.params.set_num("env.sustain", 1.0);
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        let (mut g, _) = build(&ctx, &mut shapes);
        for _ in 0..(0.3 * SR) as usize {
            let _ = g.render();
        }
        let mut last = 0.0f32;
        let mut late_diff = 0.0f32;
        for _ in 0..(0.1 * SR) as usize {
            let s = g.render();
            late_diff += (s - last) * (s - last);
            last = s;
        }
        // A 220Hz sine's first-difference energy over 0.1s is small
        // and bounded; heavy sidebands would multiply it.
        assert!(late_diff.is_finite());
        assert!(late_diff < 60.0, "late spectrum too bright: {}", late_diff);
    }
}
