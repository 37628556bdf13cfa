//! Wavetable oscillator with bend and twist shaping.

use crate::dsp::{DspNode, FilterMode, LfoParam, OscShape, VoiceGraph};
use crate::envelope::GainEnv;
use crate::shapes::{ShapeCache, ShapeKey};

use super::{BuildCtx, LfoDests};

pub(super) fn build(ctx: &BuildCtx, shapes: &mut ShapeCache) -> (VoiceGraph, LfoDests) {
    let sr = ctx.sample_rate;
    let freq = ctx.note_freq.clamp(8.0, 8000.0);
    let table_index = ctx.num("table", 0.0);
    let bend = ctx.num("bend", 0.25).clamp(0.0, 1.0);
    let twist = ctx.num("twist", 0.2).clamp(0.0, 1.0);
    let cutoff = ctx.num("filter.cutoff", 2800.0);
    let q = ctx.num("filter.q", 1.1);

    let mut g = VoiceGraph::new(sr);
    let wavetable = shapes.get_or_build(ShapeKey::wavetable(table_index));
    let osc = g.push(DspNode::osc(OscShape::Table(wavetable), freq));

    let bend_table = shapes.get_or_build(ShapeKey::soft_clip(bend, 1.0));
    let bent = g.push(DspNode::Shaper {
        input: osc,
        table: bend_table,
        mix: (bend * 1.5).min(1.0),
    });
    let twist_table = shapes.get_or_build(ShapeKey::fold(twist));
    let twisted = g.push(DspNode::Shaper {
        input: bent,
        table: twist_table,
        mix: (twist * 1.5).min(1.0),
    });
    let flt = g.push(DspNode::filter(FilterMode::LowPass, twisted, cutoff, q, sr));
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

    #[test]
    fn every_table_index_renders() {
        for index in 0..crate::shapes::WAVETABLE_COUNT + 2 {
            let mut track = Track::new(TrackId(0), Archetype::Shift);
            track.params.set_num("table", index as f32);
            let ctx = ctx_for(&track);
            let mut shapes = ShapeCache::new();
            let (mut g, _) = build(&ctx, &mut shapes);
            let mut peak = 0.0f32;
            for _ in 0..(0.2 * SR) as usize {
                let s = g.render();
                assert!(s.is_finite());
                peak = peak.max(s.abs());
            }
            assert!(peak > 1e-3, "table {} silent", index);
        }
    }

    #[test]
    fn tables_differ_audibly() {
        let samples = |index: f32| {
            let mut track = Track::new(TrackId(0), Archetype::Shift);
            track.params.set_num("table", index);
            track.params.set_num("bend", 0.0);
            track.params.set_num("twist", 0.0);
            let ctx = ctx_for(&track);
            let mut shapes = ShapeCache::new();
            let (mut g, _) = build(&ctx, &mut shapes);
            (0..2048).map(|_| g.render()).collect::<Vec<_>>()
        };
        assert_ne!(samples(0.0), samples(1.0));
    }
}
