//! Cross-modulating oscillator pair into a dual-filter topology.

use crate::dsp::{DspNode, FilterMode, LfoParam, OscShape, VoiceGraph};
use crate::envelope::{DecayEnv, GainEnv};
use crate::shapes::ShapeCache;

use super::{BuildCtx, LfoDests};

pub(super) fn build(ctx: &BuildCtx, _shapes: &mut ShapeCache) -> (VoiceGraph, LfoDests) {
    let sr = ctx.sample_rate;
    let freq = ctx.note_freq.clamp(8.0, 8000.0);
    let topology = ctx.choice("topology", "parallel");
    let fm = ctx.num("fm", 0.15).clamp(0.0, 1.0);
    let noise_amt = ctx.num("noise", 0.1).clamp(0.0, 1.0);
    let spread = ctx.num("spread", 0.6).clamp(0.0, 2.0);
    let cutoff = ctx.num("filter.cutoff", 1500.0);
    let q = ctx.num("filter.q", 0.9);
    let fenv_amount = ctx.num("filter.env", 0.5).clamp(0.0, 1.0);
    let spec = ctx.env_spec();

    let mut g = VoiceGraph::new(sr);

    // Each oscillator lightly phase-modulates the other; the second
    // reads the first a sample late, closing the cross-FM loop.
    let op_a = g.push(DspNode::osc(OscShape::Triangle, freq).with_pm(1, fm * 0.6));
    let op_b = g.push(
        DspNode::osc(OscShape::Sine, freq * 1.003).with_pm(op_a, fm * 0.6),
    );
    debug_assert_eq!(op_b, 1);
    let noise = g.push(DspNode::noise(ctx.noise_seed));
    let source = g.push(DspNode::mix_of(&[
        (op_a, 0.5),
        (op_b, 0.5),
        (noise, noise_amt * 0.5),
    ]));

    // Filter pair centers sit an octave-scaled spread apart. Each has
    // its own cutoff envelope.
    let hi = cutoff * libm::exp2f(spread * 0.5);
    let lo = cutoff * libm::exp2f(-spread * 0.5);
    let fenv = || DecayEnv::new((spec.decay * 0.6).max(0.01), sr);
    let (f_a, f_b, out) = match topology.as_str() {
        "serial" => {
            let first = g.push(
                DspNode::filter(FilterMode::LowPass, source, hi, q, sr)
                    .with_cutoff_env(fenv(), fenv_amount),
            );
            let second = g.push(
                DspNode::filter(FilterMode::HighPass, first, lo, q, sr)
                    .with_cutoff_env(fenv(), fenv_amount * 0.5),
            );
            (first, second, second)
        }
        "bandpass" => {
            let a = g.push(
                DspNode::filter(FilterMode::BandPass, source, hi, q * 2.0, sr)
                    .with_cutoff_env(fenv(), fenv_amount),
            );
            let b = g.push(
                DspNode::filter(FilterMode::BandPass, source, lo, q * 2.0, sr)
                    .with_cutoff_env(fenv(), fenv_amount),
            );
            let sum = g.push(DspNode::mix_of(&[(a, 0.8), (b, 0.8)]));
            (a, b, sum)
        }
        _ => {
            let a = g.push(
                DspNode::filter(FilterMode::LowPass, source, lo, q, sr)
                    .with_cutoff_env(fenv(), fenv_amount),
            );
            let b = g.push(
                DspNode::filter(FilterMode::HighPass, source, hi, q, sr)
                    .with_cutoff_env(fenv(), fenv_amount),
            );
            let sum = g.push(DspNode::mix_of(&[(a, 0.7), (b, 0.7)]));
            (a, b, sum)
        }
    };

    let amp = g.push(DspNode::Env {
        input: out,
        env: GainEnv::new(spec, sr),
    });
    g.set_out(amp);

    let mut dests = LfoDests::new();
    dests.push(("filter.cutoff", f_a, LfoParam::Cutoff, 1.0));
    dests.push(("filter.cutoff", f_b, LfoParam::Cutoff, 1.0));
    dests.push(("fm", op_b, LfoParam::Depth, 1.0));
    (g, dests)
}
