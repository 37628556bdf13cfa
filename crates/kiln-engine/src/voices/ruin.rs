//! Single oscillator into a selectable distortion chain.

use crate::dsp::{DspNode, FilterMode, LfoParam, OscShape, VoiceGraph};
use crate::envelope::GainEnv;
use crate::shapes::{ShapeCache, ShapeKey};

use super::{BuildCtx, LfoDests};

pub(super) fn build(ctx: &BuildCtx, shapes: &mut ShapeCache) -> (VoiceGraph, LfoDests) {
    let sr = ctx.sample_rate;
    let freq = ctx.note_freq.clamp(8.0, 8000.0);
    let algo = ctx.choice("algo", "drive");
    let drive = ctx.num("drive", 0.5).clamp(0.0, 1.0);
    let fold = ctx.num("fold", 0.3).clamp(0.0, 1.0);
    let feedback = ctx.num("feedback", 0.35).clamp(0.0, 1.0);
    let cutoff = ctx.num("filter.cutoff", 1800.0);
    let q = ctx.num("filter.q", 0.7);

    let mut g = VoiceGraph::new(sr);

    // Pre-shape stage; every algorithm lands in the same fold+filter
    // tail so switching algos keeps the voice's overall contour.
    let (osc, pre) = match algo.as_str() {
        "fm" => {
            // Self phase-modulation through a fold-shaped feedback
            // path. The osc reads the shaper one sample late, which is
            // what closes the loop.
            let fb_shape = shapes.get_or_build(ShapeKey::fold(0.4 + 0.5 * drive));
            let osc = g.push(
                DspNode::osc(OscShape::Sine, freq).with_pm(1, feedback * 0.9),
            );
            let fb = g.push(DspNode::Shaper { input: osc, table: fb_shape, mix: 1.0 });
            debug_assert_eq!(fb, 1);
            (osc, osc)
        }
        "crush" => {
            let osc = g.push(DspNode::osc(OscShape::Saw, freq));
            let bits = 16.0 - drive * 12.0;
            let table = shapes.get_or_build(ShapeKey::bitcrush(bits));
            (osc, g.push(DspNode::Shaper { input: osc, table, mix: 1.0 }))
        }
        _ => {
            let osc = g.push(DspNode::osc(OscShape::Saw, freq));
            let table = shapes.get_or_build(ShapeKey::soft_clip(drive, 1.0));
            (osc, g.push(DspNode::Shaper { input: osc, table, mix: 1.0 }))
        }
    };

    let fold_table = shapes.get_or_build(ShapeKey::fold(fold));
    let folded = g.push(DspNode::Shaper {
        input: pre,
        table: fold_table,
        mix: (fold * 1.5).min(1.0),
    });
    let flt = g.push(DspNode::filter(FilterMode::LowPass, folded, cutoff, q, sr));
    let amp = g.push(DspNode::Env {
        input: flt,
        env: GainEnv::new(ctx.env_spec(), sr),
    });
    g.set_out(amp);

    let mut dests = LfoDests::new();
    dests.push(("filter.cutoff", flt, LfoParam::Cutoff, 1.0));
    dests.push(("pitch", osc, LfoParam::Freq, 0.5));
    (g, dests)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use kiln_model::{Archetype, Track, TrackId};

    fn render_rms(algo: &str, drive: f32) -> f32 {
        let mut track = Track::new(TrackId(0), Archetype::Ruin);
        track.params.set_choice("algo", algo);
        track.params.set_num("drive", drive);
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        let (mut g, _) = build(&ctx, &mut shapes);
        let n = (0.2 * SR) as usize;
        let mut acc = 0.0f32;
        for _ in 0..n {
            let s = g.render();
            assert!(s.is_finite(), "algo {} went non-finite", algo);
            acc += s * s;
        }
        libm::sqrtf(acc / n as f32)
    }

    #[test]
    fn all_algos_render() {
        for algo in ["drive", "fm", "crush", "bogus"] {
            assert!(render_rms(algo, 0.5) > 1e-3, "algo {} silent", algo);
        }
    }

    #[test]
    fn feedback_fm_stays_bounded() {
        let mut track = Track::new(TrackId(0), Archetype::Ruin);
        track.params.set_choice("algo", "fm");
        track.params.set_num("feedback", 1.0);
        let ctx = ctx_for(&track);
        let mut shapes = ShapeCache::new();
        let (mut g, _) = build(&ctx, &mut shapes);
        for _ in 0..SR as usize {
            let s = g.render();
            assert!(s.abs() <= 2.0, "feedback blew up: {}", s);
        }
    }
}
