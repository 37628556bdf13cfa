//! Pitch-drop body plus transient click.

use crate::dsp::{DspNode, FilterMode, LfoParam, OscShape, VoiceGraph};
use crate::envelope::{EnvSpec, GainEnv};
use crate::shapes::{ShapeCache, ShapeKey};

use super::{BuildCtx, LfoDests};

pub(super) fn build(ctx: &BuildCtx, shapes: &mut ShapeCache) -> (VoiceGraph, LfoDests) {
    let sr = ctx.sample_rate;
    let tuning = ctx.num("tuning", 48.0).clamp(20.0, 400.0);
    let tone = ctx.num("tone", 0.4).clamp(0.0, 1.0);
    let impact = ctx.num("impact", 0.6).clamp(0.0, 1.0);
    let character = ctx.num("character", 0.3).clamp(0.0, 1.0);

    let mut g = VoiceGraph::new(sr);

    // Body: sine chasing an exponential drop from 8x tuning.
    let drop_seconds = 0.010 + 0.100 * tone;
    let sweep = g.push(DspNode::sweep(tuning * 8.0, tuning, drop_seconds, sr));
    let body = g.push(DspNode::osc(OscShape::Sine, tuning).with_freq_from(sweep));

    // Click: highpassed noise burst, gated hard.
    let noise = g.push(DspNode::noise(ctx.noise_seed));
    let click_hp = g.push(DspNode::filter(FilterMode::HighPass, noise, 2500.0, 0.707, sr));
    let click = g.push(DspNode::Env {
        input: click_hp,
        env: GainEnv::new(EnvSpec::new(0.0, 0.012, 0.0, 0.008), sr),
    });

    let mix = g.push(DspNode::mix_of(&[(body, 1.0), (click, impact)]));
    let table = shapes.get_or_build(ShapeKey::soft_clip(character, 1.0));
    let shaped = g.push(DspNode::Shaper { input: mix, table, mix: character });
    let amp = g.push(DspNode::Env {
        input: shaped,
        env: GainEnv::new(ctx.env_spec(), sr),
    });
    g.set_out(amp);

    let mut dests = LfoDests::new();
    dests.push(("tuning", body, LfoParam::Freq, 1.0));
    (g, dests)
}
