//! Operator pair with a selectable combine mode, folded and filtered.

use crate::dsp::{DspNode, FilterMode, LfoParam, OscShape, VoiceGraph};
use crate::envelope::GainEnv;
use crate::shapes::{ShapeCache, ShapeKey};

use super::{BuildCtx, LfoDests};

pub(super) fn build(ctx: &BuildCtx, shapes: &mut ShapeCache) -> (VoiceGraph, LfoDests) {
    let sr = ctx.sample_rate;
    let freq = ctx.note_freq.clamp(8.0, 8000.0);
    let mode = ctx.choice("mode", "pm");
    let spread = ctx.num("spread", 0.01).clamp(0.0, 0.5);
    let fold = ctx.num("fold", 0.2).clamp(0.0, 1.0);
    let cutoff = ctx.num("filter.cutoff", 2400.0);
    let q = ctx.num("filter.q", 0.8);

    let mut g = VoiceGraph::new(sr);
    let f_hi = freq * (1.0 + spread);
    let f_lo = freq * (1.0 - spread);

    // The pair's combine stage; each mode emits (op_a, op_b, out).
    let (op_a, op_b, combined) = match mode.as_str() {
        "add" => {
            let a = g.push(DspNode::osc(OscShape::Sine, f_hi));
            let b = g.push(DspNode::osc(OscShape::Triangle, f_lo));
            let sum = g.push(DspNode::mix_of(&[(a, 0.5), (b, 0.5)]));
            (a, b, sum)
        }
        "ring" => {
            let a = g.push(DspNode::osc(OscShape::Sine, f_hi));
            let b = g.push(DspNode::osc(OscShape::Sine, f_lo));
            let ring = g.push(DspNode::ring_of(&[(a, 1.0), (b, 1.0)]));
            (a, b, ring)
        }
        "sync" => {
            let master = g.push(DspNode::osc(OscShape::Sine, f_lo));
            let slave =
                g.push(DspNode::osc(OscShape::Saw, f_hi * 1.5).with_sync(master));
            (slave, master, slave)
        }
        // Phase modulation is the default for unknown modes too.
        _ => {
            let modulator = g.push(DspNode::osc(OscShape::Sine, f_lo));
            let carrier =
                g.push(DspNode::osc(OscShape::Sine, f_hi).with_pm(modulator, 0.4));
            (carrier, modulator, carrier)
        }
    };

    let table = shapes.get_or_build(ShapeKey::fold(fold));
    let folded = g.push(DspNode::Shaper {
        input: combined,
        table,
        mix: (fold * 1.5).min(1.0),
    });
    let flt = g.push(DspNode::filter(FilterMode::LowPass, folded, cutoff, q, sr));
    let amp = g.push(DspNode::Env {
        input: flt,
        env: GainEnv::new(ctx.env_spec(), sr),
    });
    g.set_out(amp);

    // Spread modulation moves the pair in opposite directions so the
    // center pitch stays put.
    let mut dests = LfoDests::new();
    dests.push(("spread", op_a, LfoParam::Freq, 0.2));
    dests.push(("spread", op_b, LfoParam::Freq, -0.2));
    dests.push(("filter.cutoff", flt, LfoParam::Cutoff, 1.0));
    (g, dests)
}
