//! Per-voice DSP graphs.
//!
//! A voice is a small arena of nodes evaluated once per sample in push
//! order. Node inputs are plain indices into the arena; reading a node
//! that has not been evaluated yet this sample returns its value from
//! the previous sample, which is how feedback paths (FM feedback, ring
//! mod loops) resolve without cycles in the evaluation order.

use arrayvec::ArrayVec;
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use kiln_model::LfoWave;

use crate::envelope::{DecayEnv, GainEnv};
use crate::shapes::{shape_sample, wavetable_sample};

/// Arena capacity; the widest archetype uses about half of this.
pub const MAX_NODES: usize = 24;

/// Filter response selected per node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    LowPass,
    HighPass,
    BandPass,
}

/// Oscillator waveform source.
#[derive(Clone, Debug)]
pub enum OscShape {
    Sine,
    Triangle,
    Saw,
    Square,
    Table(Arc<[f32]>),
}

/// How multiple inputs combine in a [`DspNode::Mix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MixOp {
    Sum,
    Ring,
}

/// Modulation targets reachable from an LFO route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LfoParam {
    /// Oscillator frequency, scaled in octaves.
    Freq,
    /// Phase-modulation depth offset.
    Depth,
    /// Filter cutoff, scaled in octaves.
    Cutoff,
    /// Whole-voice gain (tremolo). Node index is ignored.
    Gain,
    /// Whole-voice pan offset. Node index is ignored.
    Pan,
}

/// Connects an LFO node's output to a parameter somewhere in the graph.
#[derive(Clone, Copy, Debug)]
pub struct LfoRoute {
    pub lfo: u8,
    pub node: u8,
    pub param: LfoParam,
    pub scale: f32,
}

/// Per-voice effect send amounts, sampled by the mixer each block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SendLevels {
    pub reverb: f32,
    pub delay: f32,
    pub drive: f32,
}

pub enum DspNode {
    Osc {
        shape: OscShape,
        freq: f32,
        ratio: f32,
        phase: f32,
        /// Phase-mod source node and depth in cycles.
        pm: Option<(u8, f32)>,
        /// Take frequency in Hz from this node instead of `freq`.
        freq_from: Option<u8>,
        /// Reset phase when this node's output crosses zero upward.
        sync_from: Option<u8>,
        last_sync: f32,
        freq_mod: f32,
        depth_mod: f32,
    },
    Noise {
        rng: SmallRng,
    },
    Filter {
        mode: FilterMode,
        input: u8,
        filter: DirectForm2Transposed<f32>,
        base_cutoff: f32,
        q: f32,
        /// Decay envelope sweeping cutoff upward by `amount`.
        env: Option<(DecayEnv, f32)>,
        last_cutoff: f32,
        cutoff_mod: f32,
    },
    Shaper {
        input: u8,
        table: Arc<[f32]>,
        mix: f32,
    },
    Env {
        input: u8,
        env: GainEnv,
    },
    /// Exponential glide between two values, read as Hz by `freq_from`.
    Sweep {
        value: f32,
        end: f32,
        mul: f32,
    },
    Lfo {
        wave: LfoWave,
        rate: f32,
        depth: f32,
        phase: f32,
    },
    Mix {
        inputs: ArrayVec<(u8, f32), 4>,
        op: MixOp,
    },
}

impl DspNode {
    pub fn osc(shape: OscShape, freq: f32) -> Self {
        DspNode::Osc {
            shape,
            freq,
            ratio: 1.0,
            phase: 0.0,
            pm: None,
            freq_from: None,
            sync_from: None,
            last_sync: 0.0,
            freq_mod: 1.0,
            depth_mod: 1.0,
        }
    }

    pub fn noise(seed: u64) -> Self {
        DspNode::Noise { rng: SmallRng::seed_from_u64(seed) }
    }

    pub fn filter(mode: FilterMode, input: u8, cutoff: f32, q: f32, sr: f32) -> Self {
        let coeffs = make_coeffs(mode, sr, cutoff, q);
        DspNode::Filter {
            mode,
            input,
            filter: DirectForm2Transposed::<f32>::new(coeffs),
            base_cutoff: cutoff,
            q,
            env: None,
            last_cutoff: cutoff,
            cutoff_mod: 1.0,
        }
    }

    pub fn sweep(start: f32, end: f32, seconds: f32, sr: f32) -> Self {
        let tau = (seconds / 4.0).max(1e-4);
        DspNode::Sweep {
            value: start,
            end,
            mul: libm::expf(-1.0 / (tau * sr.max(1.0))),
        }
    }

    pub fn mix_of(pairs: &[(u8, f32)]) -> Self {
        let mut inputs = ArrayVec::new();
        for &p in pairs.iter().take(4) {
            inputs.push(p);
        }
        DspNode::Mix { inputs, op: MixOp::Sum }
    }

    pub fn ring_of(pairs: &[(u8, f32)]) -> Self {
        let mut inputs = ArrayVec::new();
        for &p in pairs.iter().take(4) {
            inputs.push(p);
        }
        DspNode::Mix { inputs, op: MixOp::Ring }
    }

    /// Oscillator option: take frequency in Hz from another node.
    pub fn with_freq_from(mut self, src: u8) -> Self {
        if let DspNode::Osc { freq_from, .. } = &mut self {
            *freq_from = Some(src);
        }
        self
    }

    /// Oscillator option: phase-modulate from another node's output.
    pub fn with_pm(mut self, src: u8, depth: f32) -> Self {
        if let DspNode::Osc { pm, .. } = &mut self {
            *pm = Some((src, depth));
        }
        self
    }

    /// Oscillator option: hard-sync to another node's zero crossings.
    pub fn with_sync(mut self, src: u8) -> Self {
        if let DspNode::Osc { sync_from, .. } = &mut self {
            *sync_from = Some(src);
        }
        self
    }

    /// Oscillator option: frequency ratio against the base frequency.
    pub fn with_ratio(mut self, r: f32) -> Self {
        if let DspNode::Osc { ratio, .. } = &mut self {
            *ratio = if r.is_finite() { r.max(0.0) } else { 1.0 };
        }
        self
    }

    /// Filter option: sweep cutoff upward by `amount` (in ~3-octave
    /// units) under a decay envelope.
    pub fn with_cutoff_env(mut self, env: DecayEnv, amount: f32) -> Self {
        if let DspNode::Filter { env: slot, .. } = &mut self {
            *slot = Some((env, amount));
        }
        self
    }
}

fn make_coeffs(mode: FilterMode, sr: f32, f0: f32, q: f32) -> Coefficients<f32> {
    let f0 = if f0.is_finite() { f0 } else { 1000.0 };
    let f0 = f0.clamp(10.0, sr * 0.45);
    let q = if q.is_finite() { q.clamp(0.05, 24.0) } else { 0.707 };
    let kind = match mode {
        FilterMode::LowPass => biquad::Type::LowPass,
        FilterMode::HighPass => biquad::Type::HighPass,
        FilterMode::BandPass => biquad::Type::BandPass,
    };
    // Inputs are clamped into range, so this only fails on degenerate
    // sample rates; pass audio through unchanged in that case.
    Coefficients::<f32>::from_params(kind, sr.hz(), f0.hz(), q).unwrap_or(Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    })
}

/// One voice's node arena plus the whole-voice output stage.
pub struct VoiceGraph {
    sr: f32,
    nodes: ArrayVec<DspNode, MAX_NODES>,
    routes: ArrayVec<LfoRoute, 4>,
    out: u8,
    prev: [f32; MAX_NODES],
    curr: [f32; MAX_NODES],
    gain: f32,
    gain_mod: f32,
    pan: f32,
    pan_offset: f32,
    sends: SendLevels,
}

impl VoiceGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sr: sample_rate.max(1.0),
            nodes: ArrayVec::new(),
            routes: ArrayVec::new(),
            out: 0,
            prev: [0.0; MAX_NODES],
            curr: [0.0; MAX_NODES],
            gain: 1.0,
            gain_mod: 1.0,
            pan: 0.0,
            pan_offset: 0.0,
            sends: SendLevels::default(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sr
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a node and return its arena index.
    pub fn push(&mut self, node: DspNode) -> u8 {
        debug_assert!(self.nodes.len() < MAX_NODES, "voice graph overflow");
        if self.nodes.try_push(node).is_err() {
            return (MAX_NODES - 1) as u8;
        }
        (self.nodes.len() - 1) as u8
    }

    pub fn node_mut(&mut self, index: u8) -> Option<&mut DspNode> {
        self.nodes.get_mut(index as usize)
    }

    pub fn set_out(&mut self, index: u8) {
        debug_assert!((index as usize) < self.nodes.len());
        self.out = index;
    }

    pub fn add_route(&mut self, route: LfoRoute) {
        let _ = self.routes.try_push(route);
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = if gain.is_finite() { gain.max(0.0) } else { 1.0 };
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
    }

    /// Static pan plus whatever the routes contributed last sample.
    pub fn pan(&self) -> f32 {
        (self.pan + self.pan_offset).clamp(-1.0, 1.0)
    }

    pub fn set_sends(&mut self, sends: SendLevels) {
        self.sends = sends;
    }

    pub fn sends(&self) -> SendLevels {
        self.sends
    }

    /// Evaluate every node once and return the voice's mono sample.
    pub fn render(&mut self) -> f32 {
        self.gain_mod = 1.0;
        self.pan_offset = 0.0;
        for route in &self.routes {
            let v = self.prev[route.lfo as usize] * route.scale;
            match route.param {
                LfoParam::Gain => self.gain_mod = (self.gain_mod + v).clamp(0.0, 2.0),
                LfoParam::Pan => self.pan_offset = (self.pan_offset + v).clamp(-1.0, 1.0),
                _ => {
                    if let Some(node) = self.nodes.get_mut(route.node as usize) {
                        apply_node_route(node, route.param, v);
                    }
                }
            }
        }
        for i in 0..self.nodes.len() {
            let out = eval_node(&mut self.nodes[i], i, &self.curr, &self.prev, self.sr);
            self.curr[i] = if out.is_finite() { out } else { 0.0 };
        }
        self.prev = self.curr;
        self.curr[self.out as usize] * self.gain * self.gain_mod
    }
}

fn apply_node_route(node: &mut DspNode, param: LfoParam, v: f32) {
    match (node, param) {
        (DspNode::Osc { freq_mod, .. }, LfoParam::Freq) => {
            *freq_mod *= libm::exp2f(v);
        }
        (DspNode::Osc { depth_mod, .. }, LfoParam::Depth) => {
            *depth_mod = (*depth_mod + v).max(0.0);
        }
        (DspNode::Filter { cutoff_mod, .. }, LfoParam::Cutoff) => {
            *cutoff_mod *= libm::exp2f(v);
        }
        _ => {}
    }
}

fn osc_wave(shape: &OscShape, phase: f32) -> f32 {
    match shape {
        OscShape::Sine => libm::sinf(core::f32::consts::TAU * phase),
        OscShape::Triangle => {
            let p = phase - libm::floorf(phase);
            1.0 - 4.0 * (p - 0.5).abs()
        }
        OscShape::Saw => {
            let p = phase - libm::floorf(phase);
            2.0 * p - 1.0
        }
        OscShape::Square => {
            let p = phase - libm::floorf(phase);
            if p < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        OscShape::Table(table) => wavetable_sample(table, phase),
    }
}

fn eval_node(
    node: &mut DspNode,
    idx: usize,
    curr: &[f32; MAX_NODES],
    prev: &[f32; MAX_NODES],
    sr: f32,
) -> f32 {
    // Nodes evaluated earlier this sample read fresh values; later
    // ones read last sample's, giving one-sample feedback for free.
    let read = |j: u8| {
        let j = j as usize;
        if j < idx {
            curr[j]
        } else {
            prev[j]
        }
    };
    match node {
        DspNode::Osc {
            shape,
            freq,
            ratio,
            phase,
            pm,
            freq_from,
            sync_from,
            last_sync,
            freq_mod,
            depth_mod,
        } => {
            if let Some(src) = sync_from {
                let s = read(*src);
                if *last_sync <= 0.0 && s > 0.0 {
                    *phase = 0.0;
                }
                *last_sync = s;
            }
            let base = match freq_from {
                Some(src) => read(*src).max(0.0),
                None => *freq,
            };
            let f = base * *ratio * *freq_mod;
            *phase += f / sr;
            *phase -= libm::floorf(*phase);
            let ph = match pm {
                Some((src, depth)) => *phase + read(*src) * *depth * *depth_mod,
                None => *phase,
            };
            *freq_mod = 1.0;
            *depth_mod = 1.0;
            osc_wave(shape, ph)
        }
        DspNode::Noise { rng } => rng.gen::<f32>() * 2.0 - 1.0,
        DspNode::Filter {
            mode,
            input,
            filter,
            base_cutoff,
            q,
            env,
            last_cutoff,
            cutoff_mod,
        } => {
            let mut cutoff = *base_cutoff * *cutoff_mod;
            if let Some((env, amount)) = env {
                cutoff *= libm::exp2f(*amount * 3.0 * env.next());
            }
            let cutoff = cutoff.clamp(10.0, sr * 0.45);
            // Coefficients are only recomputed on >1% moves; smaller
            // wiggle is inaudible and not worth the trig.
            if (cutoff - *last_cutoff).abs() > *last_cutoff * 0.01 {
                filter.update_coefficients(make_coeffs(*mode, sr, cutoff, *q));
                *last_cutoff = cutoff;
            }
            *cutoff_mod = 1.0;
            filter.run(read(*input))
        }
        DspNode::Shaper { input, table, mix } => {
            let x = read(*input);
            x * (1.0 - *mix) + shape_sample(table, x) * *mix
        }
        DspNode::Env { input, env } => read(*input) * env.next(),
        DspNode::Sweep { value, end, mul } => {
            *value = *end + (*value - *end) * *mul;
            *value
        }
        DspNode::Lfo { wave, rate, depth, phase } => {
            *phase += *rate / sr;
            *phase -= libm::floorf(*phase);
            let v = match wave {
                LfoWave::Sine => libm::sinf(core::f32::consts::TAU * *phase),
                LfoWave::Triangle => 1.0 - 4.0 * (*phase - 0.5).abs(),
                LfoWave::Square => {
                    if *phase < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                LfoWave::Saw => 2.0 * *phase - 1.0,
            };
            v * *depth
        }
        DspNode::Mix { inputs, op } => match op {
            MixOp::Sum => inputs.iter().map(|&(i, g)| read(i) * g).sum(),
            MixOp::Ring => inputs
                .iter()
                .fold(1.0, |acc, &(i, g)| acc * read(i) * g),
        },
    }
}
