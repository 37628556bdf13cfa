//! Struck-object resonance: a short exciter into a modal filter bank.

use crate::dsp::{DspNode, FilterMode, LfoParam, OscShape, VoiceGraph};
use crate::envelope::{EnvSpec, GainEnv};
use crate::shapes::ShapeCache;

use super::{BuildCtx, LfoDests};

/// Quasi-harmonic mode ratios; jitter offsets push them inharmonic as
/// `structure` rises.
const MODE_RATIOS: [f32; 6] = [1.0, 1.52, 2.07, 2.48, 3.33, 4.18];
const MODE_JITTER: [f32; 6] = [-0.04, 0.06, -0.09, 0.11, -0.05, 0.13];

pub(super) fn build(ctx: &BuildCtx, _shapes: &mut ShapeCache) -> (VoiceGraph, LfoDests) {
    let sr = ctx.sample_rate;
    let freq = ctx.note_freq.clamp(20.0, 4000.0);
    let exciter = ctx.choice("exciter", "noise");
    let structure = ctx.num("structure", 0.3).clamp(0.0, 1.0);
    let material = ctx.num("material", 0.5).clamp(0.0, 1.0);
    let brightness = ctx.num("brightness", 3500.0);
    let cutoff = ctx.num("filter.cutoff", 4000.0);

    let mut g = VoiceGraph::new(sr);

    // The strike: a few milliseconds of noise or a pitched thump.
    let burst_env = GainEnv::new(EnvSpec::new(0.0, 0.012, 0.0, 0.006), sr);
    let excite = match exciter.as_str() {
        "pulse" => {
            let osc = g.push(DspNode::osc(OscShape::Sine, freq * 2.0));
            g.push(DspNode::Env { input: osc, env: burst_env })
        }
        _ => {
            let noise = g.push(DspNode::noise(ctx.noise_seed));
            g.push(DspNode::Env { input: noise, env: burst_env })
        }
    };

    // Narrower bands ring longer; material drives the width.
    let band_q = 4.0 + 56.0 * material;
    let mut bands = [0u8; 6];
    for (i, slot) in bands.iter_mut().enumerate() {
        let ratio = MODE_RATIOS[i] * (1.0 + MODE_JITTER[i] * structure * 2.0);
        *slot = g.push(DspNode::filter(
            FilterMode::BandPass,
            excite,
            freq * ratio,
            band_q,
            sr,
        ));
    }
    // Mix fan-in is four wide, so sum the bank in two halves.
    let low_half = g.push(DspNode::mix_of(&[
        (bands[0], 1.0),
        (bands[1], 0.8),
        (bands[2], 0.65),
    ]));
    let high_half = g.push(DspNode::mix_of(&[
        (bands[3], 0.5),
        (bands[4], 0.4),
        (bands[5], 0.3),
    ]));
    let bank = g.push(DspNode::mix_of(&[(low_half, 2.0), (high_half, 2.0)]));

    let bright = g.push(DspNode::filter(FilterMode::LowPass, bank, brightness, 0.707, sr));
    let flt = g.push(DspNode::filter(FilterMode::LowPass, bright, cutoff, 0.707, sr));
    let amp = g.push(DspNode::Env {
        input: flt,
        env: GainEnv::new(ctx.env_spec(), sr),
    });
    g.set_out(amp);

    let mut dests = LfoDests::new();
    dests.push(("brightness", bright, LfoParam::Cutoff, 1.0));
    dests.push(("filter.cutoff", flt, LfoParam::Cutoff, 1.0));
    (g, dests)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use kiln_model::{Archetype, Track, TrackId};

    /// Render the next `seconds` of the voice and return the energy.
    fn energy_over(g: &mut VoiceGraph, seconds: f32) -> f32 {
        let mut acc = 0.0f32;
        for _ in 0..(seconds * SR) as usize {
            let s = g.render();
            assert!(s.is_finite());
            acc += s * s;
        }
        acc
    }

    #[test]
    fn both_exciters_ring() {
        for exciter in ["noise", "pulse"] {
            let mut track = Track::new(TrackId(0), Archetype::Reson);
            track.params.set_choice("exciter", exciter);
            let ctx = ctx_for(&track);
            let mut shapes = ShapeCache::new();
            let (mut g, _) = build(&ctx, &mut shapes);
            let onset = energy_over(&mut g, 0.1);
            assert!(onset > 1e-6, "exciter {} silent", exciter);
        }
    }

    #[test]
    fn harder_material_rings_longer() {
        // Ratio of ring tail to onset energy; normalizing by the onset
        // cancels the level difference between band widths.
        let tail_ratio = |material: f32| {
            let mut track = Track::new(TrackId(0), Archetype::Reson);
            track.params.set_num("material", material);
            let ctx = ctx_for(&track);
            let mut shapes = ShapeCache::new();
            let (mut g, _) = build(&ctx, &mut shapes);
            let onset = energy_over(&mut g, 0.05);
            let tail = energy_over(&mut g, 0.1);
            tail / onset.max(1e-12)
        };
        assert!(tail_ratio(1.0) > tail_ratio(0.0));
    }

    #[test]
    fn structure_moves_the_partials() {
        let sample = |structure: f32| {
            let mut track = Track::new(TrackId(0), Archetype::Reson);
            track.params.set_num("structure", structure);
            let ctx = ctx_for(&track);
            let mut shapes = ShapeCache::new();
            let (mut g, _) = build(&ctx, &mut shapes);
            (0..4096).map(|_| g.render()).collect::<Vec<_>>()
        };
        assert_ne!(sample(0.0), sample(1.0));
    }
}
